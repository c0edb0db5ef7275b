// ==========================================
// 保护定值同步系统 - 定值记录索引
// ==========================================
// 职责: 一次线性遍历构建多键索引，查找 O(1)
// - 设备标识键 → 记录列表
// - 设备名（开关名分解后）→ 记录列表
// - 记录 ID → 记录
// - 设备标识键前缀 → 记录列表（Ergon 部分匹配）
// - 变电站 + 设备名 → 记录列表（用于同名开关消歧）
// 红线: 记录只存一份，各索引只存位置；构建后不可变
// ==========================================

use crate::domain::setting::SettingRecord;
use crate::domain::types::Region;
use crate::index::{IndexBuildError, IndexResult};
use std::collections::HashMap;
use tracing::{debug, info};

/// 不含可配置定值的类型模式（子串命中即跳过）
pub const DEFAULT_EXCLUDED_PATTERNS: [&str; 10] = [
    "RTU",
    "CMGR12",
    "SEL2505_Energex",
    "GenericRelayWithoutSetting_Energex",
    "SEL-2505",
    "GenericRelayWithoutSetting",
    "T> in TMS no Current_Energex",
    "I>> 3Ph no Time I>> in A_Energex",
    "I> 1Ph no Time I in A_Energex",
    "I> 1Ph no Time I in %_Energex",
];

/// 双电缆箱后缀展开表（顺序敏感，长后缀在前）
const SUFFIX_EXPANSIONS: [(&str, &[&str]); 4] = [
    ("A+B+C", &["A", "B", "C"]),
    ("A+B+CP11", &["A", "B", "CP11"]),
    ("A+B+CP12", &["A", "B", "CP12"]),
    ("A+B", &["A", "B"]),
];

/// 组合名分隔符
const COMBINATOR: char = '+';

/// 参与前缀索引的最短长度
pub const MIN_PREFIX_LEN: usize = 4;

/// 数字变电站代码 → 字母代码（None 表示该变电站不参与匹配）
const DEFAULT_SUBSTATION_CODES: [(&str, Option<&str>); 24] = [
    ("H22", Some("LGL")),
    ("H31", Some("MRD")),
    ("H38", Some("GNA")),
    ("H4", Some("MGB")),
    ("T108", Some("BLH")),
    ("T11", Some("CBT")),
    ("T124", None),
    ("T128", Some("RBA")),
    ("T136", Some("ABM")),
    ("T142", Some("TSN")),
    ("T16", Some("NBR")),
    ("T160", Some("SMR")),
    ("T161", Some("AGT")),
    ("T162", Some("BDB")),
    ("T187", Some("RLD")),
    ("T24", Some("RBS")),
    ("T29", Some("PRG")),
    ("T30", Some("AGW")),
    ("T70", Some("CRY")),
    ("T75", Some("NRG")),
    ("T78", Some("LRE")),
    ("T8", Some("GYM")),
    ("T80", Some("RPN")),
    ("T81", Some("CCY")),
];

// ==========================================
// SettingIndexOptions - 构建选项
// ==========================================
#[derive(Debug, Clone)]
pub struct SettingIndexOptions {
    pub excluded_patterns: Vec<String>,                   // 排除的类型模式子串
    pub substation_codes: HashMap<String, Option<String>>, // 数字变电站代码映射
}

impl Default for SettingIndexOptions {
    fn default() -> Self {
        Self {
            excluded_patterns: DEFAULT_EXCLUDED_PATTERNS.iter().map(|s| s.to_string()).collect(),
            substation_codes: DEFAULT_SUBSTATION_CODES
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }
}

impl SettingIndexOptions {
    pub fn with_excluded_patterns(mut self, patterns: Vec<String>) -> Self {
        self.excluded_patterns = patterns;
        self
    }

    fn is_excluded(&self, type_pattern: &str) -> bool {
        !type_pattern.is_empty()
            && self
                .excluded_patterns
                .iter()
                .any(|p| !p.is_empty() && type_pattern.contains(p.as_str()))
    }

    /// 字母代码原样使用；数字代码查表
    fn substation_of(&self, record: &SettingRecord) -> Option<String> {
        let segment = record.substation_segment()?;
        if segment.chars().all(char::is_alphabetic) {
            return Some(segment.to_string());
        }
        self.substation_codes.get(segment).cloned().flatten()
    }
}

// ==========================================
// SettingIndex - 定值记录索引
// ==========================================
#[derive(Debug)]
pub struct SettingIndex {
    region: Region,
    records: Vec<SettingRecord>,
    by_identity: HashMap<String, Vec<usize>>,
    by_device_name: HashMap<String, Vec<usize>>,
    by_record_id: HashMap<String, usize>,
    by_substation_and_name: HashMap<String, HashMap<String, Vec<usize>>>,
    by_identity_prefix: HashMap<String, Vec<usize>>,
    skipped: usize,
}

impl SettingIndex {
    /// 使用默认选项构建索引
    pub fn build(records: Vec<SettingRecord>, region: Region) -> IndexResult<Self> {
        Self::build_with_options(records, region, &SettingIndexOptions::default())
    }

    /// 构建索引
    ///
    /// # 参数
    /// - records: 定值源返回的全部记录（按源顺序）
    /// - region: 本次运行的区域
    /// - options: 排除模式与变电站代码表
    ///
    /// # 返回
    /// - Err: 记录 ID 为空或重复（共享索引无法建立，整次运行终止）
    pub fn build_with_options(
        records: Vec<SettingRecord>,
        region: Region,
        options: &SettingIndexOptions,
    ) -> IndexResult<Self> {
        let mut index = Self {
            region,
            records: Vec::with_capacity(records.len()),
            by_identity: HashMap::new(),
            by_device_name: HashMap::new(),
            by_record_id: HashMap::new(),
            by_substation_and_name: HashMap::new(),
            by_identity_prefix: HashMap::new(),
            skipped: 0,
        };

        for record in records {
            if options.is_excluded(&record.type_pattern)
                || (region == Region::Ergon && !record.is_active())
            {
                debug!(record_id = %record.record_id, type_pattern = %record.type_pattern, "跳过定值记录");
                index.skipped += 1;
                continue;
            }

            if record.record_id.trim().is_empty() {
                return Err(IndexBuildError::EmptyRecordId {
                    device_key: record.device_key.clone(),
                });
            }
            if index.by_record_id.contains_key(&record.record_id) {
                return Err(IndexBuildError::DuplicateRecordId(record.record_id.clone()));
            }

            let pos = index.records.len();
            index.by_record_id.insert(record.record_id.clone(), pos);

            if !record.device_key.is_empty() {
                index
                    .by_identity
                    .entry(record.device_key.clone())
                    .or_default()
                    .push(pos);
                if region == Region::Ergon {
                    for prefix in identity_prefixes(&record.device_key) {
                        index
                            .by_identity_prefix
                            .entry(prefix.to_string())
                            .or_default()
                            .push(pos);
                    }
                }
            }

            let substation = options.substation_of(&record);
            for name in device_names_of(&record) {
                if let Some(sub) = &substation {
                    index
                        .by_substation_and_name
                        .entry(sub.clone())
                        .or_default()
                        .entry(name.clone())
                        .or_default()
                        .push(pos);
                }
                index.by_device_name.entry(name).or_default().push(pos);
            }

            index.records.push(record);
        }

        info!(
            region = %region,
            records = index.records.len(),
            skipped = index.skipped,
            identities = index.by_identity.len(),
            device_names = index.by_device_name.len(),
            "定值索引构建完成"
        );

        Ok(index)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 构建时被过滤的记录数
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn records(&self) -> &[SettingRecord] {
        &self.records
    }

    fn collect(&self, positions: Option<&Vec<usize>>) -> Vec<&SettingRecord> {
        positions
            .map(|p| p.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    /// 按设备标识键查找（资产名 / 设备编号）
    pub fn by_identity(&self, key: &str) -> Vec<&SettingRecord> {
        self.collect(self.by_identity.get(key))
    }

    /// 按设备标识键部分匹配（Ergon）
    ///
    /// 依次尝试: 完全相等 → 前缀 → 子串；首个有结果的层级即返回
    ///
    /// # 返回
    /// - 键短于 MIN_PREFIX_LEN 时只做完全匹配
    pub fn by_identity_partial(&self, key: &str) -> Vec<&SettingRecord> {
        let exact = self.by_identity(key);
        if !exact.is_empty() || key.chars().count() < MIN_PREFIX_LEN {
            return exact;
        }

        let prefixed = self.collect(self.by_identity_prefix.get(key));
        if !prefixed.is_empty() {
            return prefixed;
        }

        // 子串匹配需全表扫描，按源顺序返回
        self.records
            .iter()
            .filter(|r| r.device_key.contains(key))
            .collect()
    }

    /// 按设备名查找（组合名已按分量展开）
    pub fn by_device_name(&self, name: &str) -> Vec<&SettingRecord> {
        self.collect(self.by_device_name.get(name))
    }

    /// 按变电站 + 设备名查找（仅含可确定变电站的记录）
    pub fn by_device_name_in_substation(&self, substation: &str, name: &str) -> Vec<&SettingRecord> {
        self.collect(
            self.by_substation_and_name
                .get(substation)
                .and_then(|names| names.get(name)),
        )
    }

    pub fn by_record_id(&self, record_id: &str) -> Option<&SettingRecord> {
        self.by_record_id.get(record_id).map(|&i| &self.records[i])
    }

    /// 设备名索引的条目总数（每个 名称→记录 关联计一条）
    pub fn device_name_entry_count(&self) -> usize {
        self.by_device_name.values().map(Vec::len).sum()
    }
}

/// 记录参与设备名索引的名称：开关键（取 '_' 前的基础名）优先，否则为设备标识键
///
/// 开关键带 '_' 后缀时，完整开关键也作为一个名称
fn device_names_of(record: &SettingRecord) -> Vec<String> {
    let (raw, full) = match record.switch_key.as_deref().map(str::trim) {
        Some(switch_key) if !switch_key.is_empty() => {
            let base = base_switch_name(switch_key);
            (base, (base != switch_key).then_some(switch_key))
        }
        _ => (record.device_key.trim(), None),
    };

    let mut names = if raw.is_empty() {
        Vec::new()
    } else {
        expand_device_name(raw)
    };
    if let Some(full) = full {
        if !names.iter().any(|n| n == full) {
            names.push(full.to_string());
        }
    }
    names
}

/// 标识键中长度不小于 MIN_PREFIX_LEN 的真前缀（按字符边界）
fn identity_prefixes(key: &str) -> impl Iterator<Item = &str> {
    key.char_indices()
        .map(|(i, _)| i)
        .skip(MIN_PREFIX_LEN)
        .map(move |end| &key[..end])
}

/// 开关名截断到第一个 '_' 之前（"NIP1A+B_X" → "NIP1A+B"）
pub fn base_switch_name(switch_key: &str) -> &str {
    switch_key.split('_').next().unwrap_or(switch_key)
}

/// 组合名分解
///
/// - 后缀表命中: "NIP1A+B" → ["NIP1A", "NIP1B"]，"CB01A+B+C" → ["CB01A", "CB01B", "CB01C"]
/// - 其余含 '+' 的名称按分隔符切分: "X+Y" → ["X", "Y"]
/// - 不含组合符: 原样返回
pub fn expand_device_name(name: &str) -> Vec<String> {
    for (suffix, components) in SUFFIX_EXPANSIONS.iter() {
        if let Some(base) = name.strip_suffix(suffix) {
            if !base.is_empty() {
                return components.iter().map(|c| format!("{}{}", base, c)).collect();
            }
        }
    }

    if name.contains(COMBINATOR) {
        let mut parts: Vec<String> = Vec::new();
        for part in name.split(COMBINATOR).map(str::trim).filter(|p| !p.is_empty()) {
            if !parts.iter().any(|p| p == part) {
                parts.push(part.to_string());
            }
        }
        if !parts.is_empty() {
            return parts;
        }
    }

    vec![name.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, key: &str) -> SettingRecord {
        SettingRecord::new(id, key, "T1")
    }

    #[test]
    fn test_expand_suffix_table() {
        assert_eq!(expand_device_name("NIP1A+B"), vec!["NIP1A", "NIP1B"]);
        assert_eq!(expand_device_name("CB01A+B+C"), vec!["CB01A", "CB01B", "CB01C"]);
        assert_eq!(expand_device_name("CB01A+B+CP11"), vec!["CB01A", "CB01B", "CB01CP11"]);
        assert_eq!(expand_device_name("NIP1A"), vec!["NIP1A"]);
    }

    #[test]
    fn test_expand_generic_combinator() {
        assert_eq!(expand_device_name("X+Y"), vec!["X", "Y"]);
        assert_eq!(expand_device_name("FDR1+FDR2+FDR3"), vec!["FDR1", "FDR2", "FDR3"]);
        assert_eq!(expand_device_name("+"), vec!["+"]);
    }

    #[test]
    fn test_base_switch_name() {
        assert_eq!(base_switch_name("NIP1A+B_X"), "NIP1A+B");
        assert_eq!(base_switch_name("NIP1A"), "NIP1A");
    }

    #[test]
    fn test_combined_key_retrievable_under_each_component() {
        let index = SettingIndex::build(vec![record("1", "NIP1A+B")], Region::Energex).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.by_device_name("NIP1A")[0].record_id, "1");
        assert_eq!(index.by_device_name("NIP1B")[0].record_id, "1");
        assert!(index.by_device_name("NIP1A+B").is_empty());
        assert_eq!(index.by_identity("NIP1A+B").len(), 1);
    }

    #[test]
    fn test_switch_key_takes_precedence() {
        let rec = record("7", "ASSET-7").with_switch_key("CB12_OLD");
        let index = SettingIndex::build(vec![rec], Region::Energex).unwrap();

        assert_eq!(index.by_device_name("CB12").len(), 1);
        assert_eq!(index.by_device_name("CB12_OLD").len(), 1);
        assert!(index.by_device_name("ASSET-7").is_empty());
        assert_eq!(index.by_identity("ASSET-7").len(), 1);
    }

    #[test]
    fn test_full_switch_key_indexed_alongside_components() {
        let rec = record("42", "NIP1").with_switch_key("NIP1A+B_X");
        let index = SettingIndex::build(vec![rec], Region::Energex).unwrap();

        assert_eq!(index.by_device_name("NIP1A+B_X")[0].record_id, "42");
        assert_eq!(index.by_device_name("NIP1A")[0].record_id, "42");
        assert_eq!(index.by_device_name("NIP1B")[0].record_id, "42");
        assert!(index.by_device_name("NIP1A+B").is_empty());
        assert_eq!(index.device_name_entry_count(), 3);
    }

    #[test]
    fn test_identity_partial_exact_then_prefix_then_contains() {
        let records = vec![
            record("1", "RC-12345"),
            record("2", "RC-12345 Phase A"),
            record("3", "RC-12345 Phase B"),
            record("4", "OLD RC-777 Spare"),
        ];
        let index = SettingIndex::build(records, Region::Ergon).unwrap();
        let ids = |key: &str| -> Vec<String> {
            index
                .by_identity_partial(key)
                .iter()
                .map(|r| r.record_id.clone())
                .collect()
        };

        // 完全相等优先，不再返回前缀命中
        assert_eq!(ids("RC-12345"), vec!["1"]);
        assert_eq!(ids("RC-12345 Phase"), vec!["2", "3"]);
        assert_eq!(ids("RC-777"), vec!["4"]);
        assert!(ids("RC-999").is_empty());
        // 过短的键只做完全匹配
        assert!(ids("RC-").is_empty());
    }

    #[test]
    fn test_prefix_index_only_built_for_ergon() {
        let index = SettingIndex::build(vec![record("1", "RC-12345 Phase A")], Region::Energex).unwrap();
        assert!(index.by_identity_prefix.is_empty());
        // 子串回退不依赖前缀索引
        assert_eq!(index.by_identity_partial("RC-12345").len(), 1);
    }

    #[test]
    fn test_no_over_expansion_without_combinators() {
        let records: Vec<SettingRecord> = (0..50)
            .map(|i| record(&i.to_string(), &format!("SW{}", i)))
            .collect();
        let index = SettingIndex::build(records, Region::Energex).unwrap();
        assert_eq!(index.device_name_entry_count(), 50);
    }

    #[test]
    fn test_shared_decomposed_name_accumulates() {
        let records = vec![record("1", "NIP1A+B"), record("2", "NIP1A")];
        let index = SettingIndex::build(records, Region::Energex).unwrap();

        let ids: Vec<&str> = index
            .by_device_name("NIP1A")
            .iter()
            .map(|r| r.record_id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_excluded_patterns_and_inactive_ergon_records_skipped() {
        let records = vec![
            SettingRecord::new("1", "RC-1", "RTU_Generic"),
            record("2", "RC-2").with_active(false),
            record("3", "RC-3"),
        ];

        let ergon = SettingIndex::build(records.clone(), Region::Ergon).unwrap();
        assert_eq!(ergon.len(), 1);
        assert_eq!(ergon.skipped_count(), 2);
        assert!(ergon.by_record_id("3").is_some());

        // 非 Ergon 区域不按 active 过滤
        let energex = SettingIndex::build(records, Region::Energex).unwrap();
        assert_eq!(energex.len(), 2);
    }

    #[test]
    fn test_substation_scoped_lookup() {
        let records = vec![
            record("1", "CB1").with_location_path("/SEQ/North/ABC/Bay"),
            record("2", "CB1").with_location_path("/SEQ/North/H22/Bay"),
            record("3", "CB1").with_location_path("/SEQ/North/T124/Bay"),
        ];
        let index = SettingIndex::build(records, Region::Energex).unwrap();

        assert_eq!(index.by_device_name("CB1").len(), 3);
        assert_eq!(index.by_device_name_in_substation("ABC", "CB1")[0].record_id, "1");
        assert_eq!(index.by_device_name_in_substation("LGL", "CB1")[0].record_id, "2");
        assert!(index.by_device_name_in_substation("T124", "CB1").is_empty());
    }

    #[test]
    fn test_duplicate_record_id_is_fatal() {
        let result = SettingIndex::build(vec![record("1", "A"), record("1", "B")], Region::Energex);
        assert!(matches!(result, Err(IndexBuildError::DuplicateRecordId(id)) if id == "1"));
    }

    #[test]
    fn test_empty_record_id_is_fatal() {
        let result = SettingIndex::build(vec![record(" ", "A")], Region::Energex);
        assert!(matches!(result, Err(IndexBuildError::EmptyRecordId { .. })));
    }

    #[test]
    fn test_custom_excluded_patterns() {
        let options = SettingIndexOptions::default().with_excluded_patterns(vec!["T1".to_string()]);
        let index =
            SettingIndex::build_with_options(vec![record("1", "A")], Region::Energex, &options).unwrap();
        assert!(index.is_empty());
    }
}
