// ==========================================
// 保护定值同步系统 - 字段映射器
// ==========================================
// 职责: 表格行（列名 → 值）→ 领域结构 + 类型转换
// 列名支持别名，兼容旧版表头（CB_NAME / NEW_NAME 等）
// ==========================================

use crate::domain::mapping::{MappingEntry, Transform};
use crate::domain::setting::{ProtectionDevice, TypeDefinition};
use crate::domain::types::Region;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::RawRow;
use crate::index::alt_name::AltNameEntry;
use crate::rules::curve_mapping::CurveEntry;
use crate::rules::rule_store::TypeMappingEntry;
use chrono::{NaiveDate, NaiveDateTime};

/// 别名表中表示"无需映射"的占位值
const ALT_NAME_SKIP_VALUES: [&str; 4] = ["not needed", "no active setting", "wrong sub name", "unknown"];

/// 映射文件中表示"无目标属性"的占位值
const NO_DESTINATION: &str = "None";

pub struct FieldMapper;

impl FieldMapper {
    /// 提取字符串字段（空白视为缺失），支持多个可能的列名（别名）
    pub fn get_string(&self, row: &RawRow, key: &str) -> Option<String> {
        let aliases: Vec<&str> = match key {
            "source_field" => vec!["source_field", "SOURCE_FIELD", "ips_field"],
            "destination" => vec!["destination", "DESTINATION", "attribute", "pf_attribute"],
            "transform" => vec!["transform", "TRANSFORM", "adjustment"],
            "type_pattern" => vec!["type_pattern", "TYPE_PATTERN", "pattern_name"],
            "file_name" => vec!["file_name", "FILE_NAME", "mapping_file"],
            "classification" => vec!["classification", "CLASSIFICATION", "relay_type", "device_type"],
            "model_name" => vec!["model_name", "MODEL_NAME", "CB_NAME"],
            "settings_name" => vec!["settings_name", "SETTINGS_NAME", "NEW_NAME"],
            "substation" => vec!["substation", "SUBSTATION"],
            "ips_curve" => vec!["ips_curve", "IPS_CURVE", "ips_name"],
            "code" => vec!["code", "CODE"],
            "model_curve" => vec!["model_curve", "MODEL_CURVE", "pf_name"],
            _ => vec![key],
        };

        for alias in aliases {
            if let Some(v) = row.get(alias) {
                let trimmed = v.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    }

    fn require(&self, row: &RawRow, key: &str, row_number: usize) -> ImportResult<String> {
        self.get_string(row, key).ok_or_else(|| ImportError::MissingColumn {
            row: row_number,
            field: key.to_string(),
        })
    }

    /// 映射文件行 → MappingEntry
    ///
    /// # 返回
    /// - Ok(None): 目标属性为 "None" 的占位行
    /// - Err: 必填列缺失或变换标签无法识别
    pub fn map_to_mapping_entry(
        &self,
        row: &RawRow,
        row_number: usize,
    ) -> ImportResult<Option<MappingEntry>> {
        let source_field = self.require(row, "source_field", row_number)?;
        let destination = self.require(row, "destination", row_number)?;
        if destination == NO_DESTINATION {
            return Ok(None);
        }

        let mut entry = MappingEntry::new(source_field, destination);
        if let Some(tag) = self.get_string(row, "transform") {
            let transform = tag
                .parse::<Transform>()
                .map_err(|message| ImportError::FieldMappingError {
                    row: row_number,
                    message,
                })?;
            entry = entry.with_transform(transform);
        }
        Ok(Some(entry))
    }

    /// 类型映射表行 → TypeMappingEntry
    pub fn map_to_type_mapping(
        &self,
        row: &RawRow,
        row_number: usize,
    ) -> ImportResult<TypeMappingEntry> {
        Ok(TypeMappingEntry {
            type_pattern: self.require(row, "type_pattern", row_number)?,
            file_name: self.require(row, "file_name", row_number)?,
            classification: self.get_string(row, "classification"),
        })
    }

    /// 别名表行 → AltNameEntry（占位值行返回 None）
    pub fn map_to_alt_name(
        &self,
        row: &RawRow,
        row_number: usize,
    ) -> ImportResult<Option<AltNameEntry>> {
        let model_name = self.require(row, "model_name", row_number)?;
        let settings_name = match self.get_string(row, "settings_name") {
            Some(name) => name,
            None => return Ok(None),
        };

        if ALT_NAME_SKIP_VALUES.contains(&settings_name.to_lowercase().as_str()) {
            return Ok(None);
        }

        Ok(Some(AltNameEntry {
            model_name,
            settings_name,
            substation: self.get_string(row, "substation"),
        }))
    }

    /// 曲线映射表行 → CurveEntry
    pub fn map_to_curve(&self, row: &RawRow, row_number: usize) -> ImportResult<CurveEntry> {
        Ok(CurveEntry {
            ips_curve: self.get_string(row, "ips_curve").unwrap_or_default(),
            code: self.require(row, "code", row_number)?,
            model_curve: self.require(row, "model_curve", row_number)?,
        })
    }

    /// 模型快照行 → ProtectionDevice
    pub fn map_to_device(
        &self,
        row: &RawRow,
        row_number: usize,
        region: Region,
    ) -> ImportResult<ProtectionDevice> {
        let name = self.require(row, "name", row_number)?;
        let handle = self.get_string(row, "handle").unwrap_or_else(|| name.clone());
        let type_pattern = self.require(row, "type_pattern", row_number)?;

        let mut device = ProtectionDevice::new(handle, name, type_pattern, region);
        if let Some(substation) = self.get_string(row, "substation") {
            device = device.with_substation(substation);
        }
        Ok(device)
    }

    /// 类型库快照行 → TypeDefinition（attributes 以 '|' 分隔）
    pub fn map_to_type_definition(
        &self,
        row: &RawRow,
        row_number: usize,
    ) -> ImportResult<TypeDefinition> {
        let name = self.require(row, "name", row_number)?;
        let pattern = self.get_string(row, "type_pattern").unwrap_or_else(|| name.clone());
        let attributes: Vec<String> = self
            .get_string(row, "attributes")
            .map(|raw| {
                raw.split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(TypeDefinition::new(name, pattern).with_attributes(attributes))
    }

    /// 解析布尔字段（1/0, true/false, yes/no, y/n）
    pub fn parse_bool(
        &self,
        row: &RawRow,
        key: &str,
        row_number: usize,
    ) -> ImportResult<Option<bool>> {
        match self.get_string(row, key) {
            None => Ok(None),
            Some(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => Ok(Some(true)),
                "0" | "false" | "no" | "n" => Ok(Some(false)),
                _ => Err(ImportError::TypeConversionError {
                    row: row_number,
                    field: key.to_string(),
                    message: format!("无法解析为布尔值: {}", value),
                }),
            },
        }
    }
}

/// 解析定值日期
///
/// 支持格式:
/// - YYYY-MM-DD HH:MM:SS / YYYY-MM-DDTHH:MM:SS
/// - YYYY-MM-DD / YYYYMMDD / DD/MM/YYYY（时间取 00:00:00）
pub fn parse_setting_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }

    for fmt in ["%Y-%m-%d", "%Y%m%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}
