// ==========================================
// 保护定值同步系统 - 映射规则库
// ==========================================
// 职责:
// - 类型映射表: 类型模式 → 映射文件名 + 设备分类
// - get_rules: 按类型模式加载映射文件，运行内缓存
// - apply: 逐条规则读取源字段 → 变换 → 写模型（每条规则至多一次写入）
// ==========================================

use crate::domain::mapping::MappingEntry;
use crate::domain::setting::{DeviceHandle, SettingRecord};
use crate::domain::update_result::{FieldOutcome, FieldStatus};
use crate::engine::model::{ModelError, NetworkModel, WriteStatus};
use crate::importer::{FieldMapper, FileParser, ImportError, UniversalFileParser};
use crate::rules::curve_mapping::CurveMapping;
use crate::rules::transform::apply_transform;
use crate::rules::{RuleError, RuleResult};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 映射文件默认扩展名（类型映射表中的文件名可省略扩展名）
const RULE_FILE_EXTENSION: &str = "csv";

/// 类型映射表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMappingEntry {
    pub type_pattern: String,           // 类型模式
    pub file_name: String,              // 映射文件名
    pub classification: Option<String>, // 设备分类（relay / fuse ...）
}

/// 缓存统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub type_table_loads: usize, // 类型映射表加载次数
    pub rule_file_hits: usize,   // 映射规则缓存命中
    pub rule_file_misses: usize, // 映射规则缓存未命中（读文件）
    pub cached_types: usize,     // 已缓存的类型模式数
}

#[derive(Debug)]
pub struct RuleStore {
    rules_dir: PathBuf,
    type_table: HashMap<String, TypeMappingEntry>,
    cache: HashMap<String, Arc<Vec<MappingEntry>>>,
    curves: CurveMapping,
    stats: CacheStats,
}

impl RuleStore {
    /// 加载类型映射表，创建空缓存的规则库
    ///
    /// # 参数
    /// - type_mapping_file: 类型映射表路径
    /// - rules_dir: 映射文件所在目录
    /// - curves: 曲线映射表
    pub fn load(type_mapping_file: &Path, rules_dir: &Path, curves: CurveMapping) -> RuleResult<Self> {
        if !type_mapping_file.exists() {
            return Err(RuleError::TypeMappingNotFound(
                type_mapping_file.display().to_string(),
            ));
        }

        let malformed = |source| RuleError::Malformed {
            path: type_mapping_file.display().to_string(),
            source,
        };
        let rows = UniversalFileParser
            .parse_to_raw_records(type_mapping_file)
            .map_err(malformed)?;

        let mapper = FieldMapper;
        let entries = rows
            .iter()
            .enumerate()
            .map(|(i, row)| mapper.map_to_type_mapping(row, i + 2))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;

        let mut store = Self::from_parts(entries, rules_dir, curves);
        store.stats.type_table_loads += 1;
        info!(
            path = %type_mapping_file.display(),
            types = store.type_table.len(),
            "类型映射表加载完成"
        );
        Ok(store)
    }

    /// 由已解析的类型映射条目构建（同一类型模式后出现者覆盖先出现者）
    pub fn from_parts(
        type_table: Vec<TypeMappingEntry>,
        rules_dir: impl Into<PathBuf>,
        curves: CurveMapping,
    ) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            type_table: type_table
                .into_iter()
                .map(|e| (e.type_pattern.clone(), e))
                .collect(),
            cache: HashMap::new(),
            curves,
            stats: CacheStats::default(),
        }
    }

    pub fn type_mapping(&self, type_pattern: &str) -> Option<&TypeMappingEntry> {
        self.type_table.get(type_pattern)
    }

    pub fn curves(&self) -> &CurveMapping {
        &self.curves
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            cached_types: self.cache.len(),
            ..self.stats.clone()
        }
    }

    fn rule_file_path(&self, file_name: &str) -> PathBuf {
        let path = self.rules_dir.join(file_name);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(RULE_FILE_EXTENSION)
        }
    }

    /// 获取类型模式对应的映射规则
    ///
    /// # 返回
    /// - Ok(None): 类型映射表中无此类型
    /// - Ok(Some): 规则列表（文件行序）
    /// - Err: 映射文件缺失或格式错误
    pub fn get_rules(&mut self, type_pattern: &str) -> RuleResult<Option<Arc<Vec<MappingEntry>>>> {
        if let Some(rules) = self.cache.get(type_pattern) {
            self.stats.rule_file_hits += 1;
            return Ok(Some(Arc::clone(rules)));
        }

        let file_name = match self.type_table.get(type_pattern) {
            Some(entry) => entry.file_name.clone(),
            None => return Ok(None),
        };

        self.stats.rule_file_misses += 1;
        let path = self.rule_file_path(&file_name);
        let rules = Arc::new(load_rule_file(type_pattern, &path)?);
        debug!(type_pattern = %type_pattern, path = %path.display(), rules = rules.len(), "映射文件已加载");

        self.cache.insert(type_pattern.to_string(), Arc::clone(&rules));
        Ok(Some(rules))
    }

    /// 将定值记录按规则写入目标设备
    ///
    /// # 返回
    /// - Ok: 每条规则一个字段结果（规则顺序）
    /// - Err: 模型故障，立即中止该设备
    pub fn apply(
        &self,
        record: &SettingRecord,
        rules: &[MappingEntry],
        target: &DeviceHandle,
        model: &mut dyn NetworkModel,
    ) -> Result<Vec<FieldOutcome>, ModelError> {
        let mut outcomes = Vec::with_capacity(rules.len());

        for rule in rules {
            let status = match record.field(&rule.source_field) {
                None => FieldStatus::Skipped {
                    reason: format!("定值记录缺少字段 {}", rule.source_field),
                },
                Some(raw) => match apply_transform(rule.transform.as_ref(), raw, &self.curves) {
                    Err(e) => FieldStatus::TransformFailed { message: e.to_string() },
                    Ok(value) => match model.write(target, &rule.destination, &value)? {
                        WriteStatus::Accepted => FieldStatus::Written { value },
                        WriteStatus::Rejected(message) => FieldStatus::WriteRejected { message },
                    },
                },
            };

            outcomes.push(FieldOutcome {
                source_field: rule.source_field.clone(),
                destination: rule.destination.clone(),
                status,
            });
        }

        Ok(outcomes)
    }
}

/// 读取单个映射文件（跳过目标属性为 "None" 的占位行）
fn load_rule_file(type_pattern: &str, path: &Path) -> RuleResult<Vec<MappingEntry>> {
    let display = path.display().to_string();
    let rows = UniversalFileParser
        .parse_to_raw_records(path)
        .map_err(|source| match source {
            ImportError::FileNotFound(_) => RuleError::RuleFileNotFound {
                type_pattern: type_pattern.to_string(),
                path: display.clone(),
            },
            other => RuleError::Malformed {
                path: display.clone(),
                source: other,
            },
        })?;

    let mapper = FieldMapper;
    let mut rules = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        match mapper.map_to_mapping_entry(row, i + 2) {
            Ok(Some(entry)) => rules.push(entry),
            Ok(None) => {}
            Err(ImportError::FieldMappingError { row, message }) => {
                return Err(RuleError::UnknownTransform {
                    path: display,
                    row,
                    message,
                })
            }
            Err(source) => {
                return Err(RuleError::Malformed {
                    path: display,
                    source,
                })
            }
        }
    }
    Ok(rules)
}
