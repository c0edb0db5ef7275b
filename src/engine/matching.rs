// ==========================================
// 保护定值同步系统 - 匹配策略
// ==========================================
// 职责: 模型设备 → 候选定值记录（0..n 条）
// - IdentityNameStrategy: 开关名直查，未命中时经别名重试一次（Energex）
// - PlantNumberStrategy: 设备名提取设备编号后直查，未命中时部分匹配（Ergon）
// - TieBreakPolicy: 多候选时的决胜规则
// 策略按区域在运行开始时选定一次
// ==========================================

use crate::domain::setting::{ProtectionDevice, SettingRecord};
use crate::domain::types::Region;
use crate::index::{base_switch_name, AltNameTable, SettingIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// 开关名最短有效长度
pub const MIN_SWITCH_NAME_LEN: usize = 4;

/// 设备编号前缀（重合器 / 熔断器）
const PLANT_NUMBER_PREFIXES: [&str; 5] = ["RC-", "RE-", "DO-", "FU-", "DL-"];

// ==========================================
// MatchingStrategy Trait
// ==========================================
pub trait MatchingStrategy {
    fn name(&self) -> &'static str;

    /// 查找候选记录（按索引中的插入顺序）
    fn find_candidates<'a>(
        &self,
        device: &ProtectionDevice,
        index: &'a SettingIndex,
        alt_names: &AltNameTable,
    ) -> Vec<&'a SettingRecord>;
}

/// 按区域选择匹配策略
pub fn strategy_for(region: Region) -> Box<dyn MatchingStrategy> {
    match region {
        Region::Energex => Box::new(IdentityNameStrategy),
        Region::Ergon => Box::new(PlantNumberStrategy),
    }
}

// ==========================================
// IdentityNameStrategy - 开关名匹配
// ==========================================
pub struct IdentityNameStrategy;

impl IdentityNameStrategy {
    /// 设备带变电站时优先取变电站限定结果
    fn lookup<'a>(
        index: &'a SettingIndex,
        name: &str,
        substation: Option<&str>,
    ) -> Vec<&'a SettingRecord> {
        if let Some(sub) = substation {
            let scoped = index.by_device_name_in_substation(sub, name);
            if !scoped.is_empty() {
                return scoped;
            }
        }
        index.by_device_name(name)
    }
}

impl MatchingStrategy for IdentityNameStrategy {
    fn name(&self) -> &'static str {
        "identity-name"
    }

    fn find_candidates<'a>(
        &self,
        device: &ProtectionDevice,
        index: &'a SettingIndex,
        alt_names: &AltNameTable,
    ) -> Vec<&'a SettingRecord> {
        // 模型侧开关名同样只取 '_' 之前的部分
        let full_name = device.name.trim();
        let name = base_switch_name(full_name);
        if name.chars().count() < MIN_SWITCH_NAME_LEN {
            debug!(device = %device.name, "开关名过短，不参与匹配");
            return Vec::new();
        }

        let substation = device.substation.as_deref();
        let hits = Self::lookup(index, name, substation);
        if !hits.is_empty() {
            return hits;
        }

        let alt = alt_names
            .lookup_in(full_name, substation)
            .or_else(|| alt_names.lookup_in(name, substation))
            .map(|alt| base_switch_name(alt.trim()));
        match alt {
            Some(alt) if alt != name && alt.chars().count() >= MIN_SWITCH_NAME_LEN => {
                debug!(device = %device.name, alt_name = %alt, "按别名重试匹配");
                Self::lookup(index, alt, substation)
            }
            _ => Vec::new(),
        }
    }
}

// ==========================================
// PlantNumberStrategy - 设备编号匹配
// ==========================================
pub struct PlantNumberStrategy;

/// 从设备名提取设备编号
///
/// 识别规则:
/// - 继电保护: 第 5~7 个字符为 "SS-"（{SUB}SS-{BAY}-{Device}）
/// - 重合器 / 熔断器: 以 RC- / RE- / DO- / FU- / DL- 开头
///
/// 设备编号为第一个空格之前的部分
pub fn extract_plant_number(device_name: &str) -> Option<&str> {
    let name = device_name.trim();
    let recognised = name.get(4..7) == Some("SS-")
        || PLANT_NUMBER_PREFIXES.iter().any(|p| name.starts_with(p));
    if !recognised {
        return None;
    }
    name.split(' ').next().filter(|s| !s.is_empty())
}

impl MatchingStrategy for PlantNumberStrategy {
    fn name(&self) -> &'static str {
        "plant-number"
    }

    fn find_candidates<'a>(
        &self,
        device: &ProtectionDevice,
        index: &'a SettingIndex,
        _alt_names: &AltNameTable,
    ) -> Vec<&'a SettingRecord> {
        let plant_number = match extract_plant_number(&device.name) {
            Some(p) => p,
            None => {
                debug!(device = %device.name, "设备名不含设备编号");
                return Vec::new();
            }
        };

        if let Some(record) = index.by_record_id(plant_number) {
            return vec![record];
        }
        let hits = index.by_identity_partial(plant_number);
        if hits.len() > 1 || hits.first().is_some_and(|r| r.device_key != plant_number) {
            debug!(device = %device.name, plant_number, candidates = hits.len(), "设备编号部分匹配");
        }
        hits
    }
}

// ==========================================
// TieBreakPolicy - 多候选决胜
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TieBreakPolicy {
    #[default]
    LatestThenLowestId, // 定值日期最新，其次记录 ID 字典序最小
    FirstSeen,          // 按定值源顺序取第一条
}

impl fmt::Display for TieBreakPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreakPolicy::LatestThenLowestId => write!(f, "LATEST_THEN_LOWEST_ID"),
            TieBreakPolicy::FirstSeen => write!(f, "FIRST_SEEN"),
        }
    }
}

impl FromStr for TieBreakPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LATEST_THEN_LOWEST_ID" => Ok(TieBreakPolicy::LatestThenLowestId),
            "FIRST_SEEN" => Ok(TieBreakPolicy::FirstSeen),
            other => Err(format!("未知决胜策略: {}", other)),
        }
    }
}

/// 决胜结果
#[derive(Debug, Clone)]
pub struct TieBreak<'a> {
    pub selected: &'a SettingRecord,
    /// 与选中记录无法区分的全部候选 ID（含选中者，升序）；少于两条时为空
    pub ambiguous: Vec<String>,
}

impl<'a> TieBreak<'a> {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous.is_empty()
    }
}

impl TieBreakPolicy {
    /// 从候选中选出一条
    ///
    /// # 返回
    /// - None: 无候选
    pub fn select<'a>(&self, candidates: &[&'a SettingRecord]) -> Option<TieBreak<'a>> {
        let first = *candidates.first()?;

        let (selected, mut tied): (&SettingRecord, Vec<String>) = match self {
            TieBreakPolicy::FirstSeen => (
                first,
                candidates.iter().map(|r| r.record_id.clone()).collect(),
            ),
            TieBreakPolicy::LatestThenLowestId => {
                let latest = candidates.iter().map(|r| r.date_setting).max().flatten();
                let same_date: Vec<&'a SettingRecord> = candidates
                    .iter()
                    .copied()
                    .filter(|r| r.date_setting == latest)
                    .collect();
                let winner = same_date
                    .iter()
                    .copied()
                    .min_by(|a, b| a.record_id.cmp(&b.record_id))
                    .unwrap_or(first);
                (winner, same_date.iter().map(|r| r.record_id.clone()).collect())
            }
        };

        tied.sort();
        tied.dedup();
        if tied.len() < 2 {
            tied.clear();
        }

        Some(TieBreak {
            selected,
            ambiguous: tied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::AltNameEntry;
    use chrono::NaiveDate;

    fn dated(id: &str, key: &str, day: u32) -> SettingRecord {
        SettingRecord::new(id, key, "T1").with_date(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn energex(name: &str) -> ProtectionDevice {
        ProtectionDevice::new(name, name, "T1", Region::Energex)
    }

    #[test]
    fn test_extract_plant_number() {
        assert_eq!(extract_plant_number("RC-12345 Phase A"), Some("RC-12345"));
        assert_eq!(extract_plant_number("ABCDSS-01-OC"), Some("ABCDSS-01-OC"));
        assert_eq!(extract_plant_number("FU-9"), Some("FU-9"));
        assert_eq!(extract_plant_number("CB01"), None);
        assert_eq!(extract_plant_number("SS-"), None);
    }

    #[test]
    fn test_identity_name_direct_hit() {
        let index = SettingIndex::build(vec![SettingRecord::new("1", "NIP1A+B", "T1")], Region::Energex).unwrap();
        let hits = IdentityNameStrategy.find_candidates(&energex("NIP1B"), &index, &AltNameTable::default());
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_identity_name_alt_name_retry() {
        let index = SettingIndex::build(vec![SettingRecord::new("1", "SW100", "T1")], Region::Energex).unwrap();
        let alt = AltNameTable::from_entries(vec![AltNameEntry {
            model_name: "CB100".into(),
            settings_name: "SW100".into(),
            substation: None,
        }]);

        let hits = IdentityNameStrategy.find_candidates(&energex("CB100"), &index, &alt);
        assert_eq!(hits[0].record_id, "1");

        // 无别名时回退原名，不报错
        let none = IdentityNameStrategy.find_candidates(&energex("CB200"), &index, &alt);
        assert!(none.is_empty());
    }

    #[test]
    fn test_identity_name_scoped_alt_name_stays_in_its_substation() {
        let index = SettingIndex::build(vec![SettingRecord::new("1", "NIP1A", "T1")], Region::Energex).unwrap();
        let alt = AltNameTable::from_entries(vec![AltNameEntry {
            model_name: "CB01".into(),
            settings_name: "NIP1A".into(),
            substation: Some("ABC".into()),
        }]);

        let elsewhere = energex("CB01").with_substation("XYZ");
        assert!(IdentityNameStrategy.find_candidates(&elsewhere, &index, &alt).is_empty());

        let own = energex("CB01").with_substation("ABC");
        assert_eq!(IdentityNameStrategy.find_candidates(&own, &index, &alt)[0].record_id, "1");
    }

    #[test]
    fn test_identity_name_model_name_cut_at_underscore() {
        let index = SettingIndex::build(
            vec![SettingRecord::new("1", "ASSET-1", "T1").with_switch_key("CB01_OLD")],
            Region::Energex,
        )
        .unwrap();
        let hits = IdentityNameStrategy.find_candidates(&energex("CB01_NEW"), &index, &AltNameTable::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, "1");

        // 截断后过短同样忽略
        let short = IdentityNameStrategy.find_candidates(&energex("CB1_LONGSUFFIX"), &index, &AltNameTable::default());
        assert!(short.is_empty());
    }

    #[test]
    fn test_identity_name_alt_name_cut_at_underscore() {
        let index = SettingIndex::build(vec![SettingRecord::new("1", "SW100", "T1")], Region::Energex).unwrap();
        let alt = AltNameTable::from_entries(vec![AltNameEntry {
            model_name: "CB100".into(),
            settings_name: "SW100_SPARE".into(),
            substation: None,
        }]);
        let hits = IdentityNameStrategy.find_candidates(&energex("CB100"), &index, &alt);
        assert_eq!(hits[0].record_id, "1");
    }

    #[test]
    fn test_identity_name_short_names_ignored() {
        let index = SettingIndex::build(vec![SettingRecord::new("1", "CB1", "T1")], Region::Energex).unwrap();
        let hits = IdentityNameStrategy.find_candidates(&energex("CB1"), &index, &AltNameTable::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_identity_name_prefers_substation_scope() {
        let index = SettingIndex::build(
            vec![
                SettingRecord::new("1", "CB01", "T1").with_location_path("/SEQ/N/ABC/x"),
                SettingRecord::new("2", "CB01", "T1").with_location_path("/SEQ/N/XYZ/x"),
            ],
            Region::Energex,
        )
        .unwrap();

        let device = energex("CB01").with_substation("XYZ");
        let hits = IdentityNameStrategy.find_candidates(&device, &index, &AltNameTable::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, "2");
    }

    #[test]
    fn test_plant_number_record_id_then_identity() {
        let index = SettingIndex::build(
            vec![
                SettingRecord::new("RC-100", "asset-a", "T1"),
                SettingRecord::new("9", "RC-200", "T1"),
            ],
            Region::Ergon,
        )
        .unwrap();
        let strategy = PlantNumberStrategy;
        let alt = AltNameTable::default();

        let by_id = ProtectionDevice::new("h", "RC-100 Main", "T1", Region::Ergon);
        assert_eq!(strategy.find_candidates(&by_id, &index, &alt)[0].record_id, "RC-100");

        let by_asset = ProtectionDevice::new("h", "RC-200", "T1", Region::Ergon);
        assert_eq!(strategy.find_candidates(&by_asset, &index, &alt)[0].record_id, "9");

        let other = ProtectionDevice::new("h", "CB01", "T1", Region::Ergon);
        assert!(strategy.find_candidates(&other, &index, &alt).is_empty());
    }

    #[test]
    fn test_plant_number_falls_back_to_partial_asset_match() {
        let index = SettingIndex::build(
            vec![
                SettingRecord::new("1", "RC-300 Phase A", "T1"),
                SettingRecord::new("2", "Spare FU-42 Link", "T1"),
                SettingRecord::new("3", "RC-300", "T1"),
            ],
            Region::Ergon,
        )
        .unwrap();
        let strategy = PlantNumberStrategy;
        let alt = AltNameTable::default();

        let exact = ProtectionDevice::new("h", "RC-300 Main", "T1", Region::Ergon);
        let ids: Vec<&str> = strategy
            .find_candidates(&exact, &index, &alt)
            .iter()
            .map(|r| r.record_id.as_str())
            .collect();
        assert_eq!(ids, vec!["3"]);

        let prefixed = ProtectionDevice::new("h", "RC-30", "T1", Region::Ergon);
        assert_eq!(strategy.find_candidates(&prefixed, &index, &alt).len(), 2);

        let contained = ProtectionDevice::new("h", "FU-42 Fuse", "T1", Region::Ergon);
        assert_eq!(strategy.find_candidates(&contained, &index, &alt)[0].record_id, "2");
    }

    #[test]
    fn test_tie_break_latest_then_lowest_id() {
        let a = dated("b", "X", 1);
        let b = dated("c", "X", 5);
        let c = dated("a", "X", 5);
        let result = TieBreakPolicy::LatestThenLowestId.select(&[&a, &b, &c]).unwrap();

        assert_eq!(result.selected.record_id, "a");
        assert_eq!(result.ambiguous, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_tie_break_unique_latest_not_ambiguous() {
        let a = dated("1", "X", 1);
        let b = dated("2", "X", 2);
        let result = TieBreakPolicy::LatestThenLowestId.select(&[&a, &b]).unwrap();
        assert_eq!(result.selected.record_id, "2");
        assert!(!result.is_ambiguous());
    }

    #[test]
    fn test_tie_break_undated_loses_to_dated() {
        let undated = SettingRecord::new("0", "X", "T1");
        let dated_rec = dated("9", "X", 1);
        let result = TieBreakPolicy::LatestThenLowestId.select(&[&undated, &dated_rec]).unwrap();
        assert_eq!(result.selected.record_id, "9");
    }

    #[test]
    fn test_tie_break_first_seen() {
        let a = dated("2", "X", 1);
        let b = dated("1", "X", 9);
        let result = TieBreakPolicy::FirstSeen.select(&[&a, &b]).unwrap();
        assert_eq!(result.selected.record_id, "2");
        assert!(result.is_ambiguous());
        assert!(TieBreakPolicy::FirstSeen.select(&[]).is_none());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("first_seen".parse::<TieBreakPolicy>().unwrap(), TieBreakPolicy::FirstSeen);
        assert_eq!(TieBreakPolicy::default().to_string(), "LATEST_THEN_LOWEST_ID");
        assert!("random".parse::<TieBreakPolicy>().is_err());
    }
}
