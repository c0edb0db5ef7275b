// ==========================================
// 保护定值同步系统 - 设备更新结果
// ==========================================
// 每台被处理的设备恰好产生一个 UpdateResult
// 全部结果按处理顺序追加，是一次运行对外的唯一输出
// ==========================================

use crate::domain::setting::{ProtectionDevice, SettingRecord};
use crate::domain::types::{SettingValue, UpdateStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// FieldStatus - 单字段写入结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    Written { value: SettingValue },   // 模型接受写入
    Skipped { reason: String },        // 源字段缺失等，未写入
    TransformFailed { message: String }, // 变换失败，未写入
    WriteRejected { message: String }, // 模型拒绝写入
}

impl FieldStatus {
    fn short(&self) -> &'static str {
        match self {
            FieldStatus::Written { .. } => "ok",
            FieldStatus::Skipped { .. } => "skipped",
            FieldStatus::TransformFailed { .. } => "transform_failed",
            FieldStatus::WriteRejected { .. } => "rejected",
        }
    }
}

// ==========================================
// FieldOutcome - 单条映射规则的执行结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub source_field: String,
    pub destination: String,
    pub status: FieldStatus,
}

impl FieldOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self.status, FieldStatus::Written { .. })
    }

    pub fn is_write_rejected(&self) -> bool {
        matches!(self.status, FieldStatus::WriteRejected { .. })
    }
}

// ==========================================
// UpdateOutcome - 按状态区分的结果负载
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOutcome {
    Updated {
        record_id: String,
        date_setting: Option<NaiveDateTime>,
        fields: Vec<FieldOutcome>,
        /// 决胜后仍并列的候选记录 ID（非空即需人工复核）
        ambiguous_candidates: Vec<String>,
    },
    NotFoundInSource,
    TypeUnresolved {
        type_pattern: String,
    },
    Failed {
        error: String,
        device_context: String,
    },
    Informational {
        message: String,
    },
}

// ==========================================
// UpdateResult - 设备更新结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub device_name: String,
    pub substation: Option<String>,
    pub type_pattern: String,
    pub outcome: UpdateOutcome,
}

impl UpdateResult {
    fn for_device(device: &ProtectionDevice, outcome: UpdateOutcome) -> Self {
        Self {
            device_name: device.name.clone(),
            substation: device.substation.clone(),
            type_pattern: device.type_pattern.clone(),
            outcome,
        }
    }

    pub fn updated(
        device: &ProtectionDevice,
        record: &SettingRecord,
        fields: Vec<FieldOutcome>,
        ambiguous_candidates: Vec<String>,
    ) -> Self {
        Self::for_device(
            device,
            UpdateOutcome::Updated {
                record_id: record.record_id.clone(),
                date_setting: record.date_setting,
                fields,
                ambiguous_candidates,
            },
        )
    }

    pub fn not_found_in_source(device: &ProtectionDevice) -> Self {
        Self::for_device(device, UpdateOutcome::NotFoundInSource)
    }

    pub fn type_unresolved(device: &ProtectionDevice) -> Self {
        Self::for_device(
            device,
            UpdateOutcome::TypeUnresolved {
                type_pattern: device.type_pattern.clone(),
            },
        )
    }

    pub fn failed(device: &ProtectionDevice, error: impl Into<String>) -> Self {
        Self::for_device(
            device,
            UpdateOutcome::Failed {
                error: error.into(),
                device_context: device.diagnostic_context(),
            },
        )
    }

    pub fn informational(device: &ProtectionDevice, message: impl Into<String>) -> Self {
        Self::for_device(
            device,
            UpdateOutcome::Informational {
                message: message.into(),
            },
        )
    }

    pub fn status(&self) -> UpdateStatus {
        match self.outcome {
            UpdateOutcome::Updated { .. } => UpdateStatus::Updated,
            UpdateOutcome::NotFoundInSource => UpdateStatus::NotFoundInSource,
            UpdateOutcome::TypeUnresolved { .. } => UpdateStatus::TypeUnresolved,
            UpdateOutcome::Failed { .. } => UpdateStatus::Failed,
            UpdateOutcome::Informational { .. } => UpdateStatus::Informational,
        }
    }

    pub fn fields(&self) -> &[FieldOutcome] {
        match &self.outcome {
            UpdateOutcome::Updated { fields, .. } => fields,
            _ => &[],
        }
    }

    /// 已下发但有字段被模型拒绝
    pub fn has_partial_failure(&self) -> bool {
        self.fields().iter().any(FieldOutcome::is_write_rejected)
    }

    pub fn error_detail(&self) -> Option<String> {
        match &self.outcome {
            UpdateOutcome::Failed { error, .. } => Some(error.clone()),
            UpdateOutcome::Informational { message } => Some(message.clone()),
            UpdateOutcome::Updated { fields, .. } => {
                let rejected: Vec<String> = fields
                    .iter()
                    .filter_map(|f| match &f.status {
                        FieldStatus::WriteRejected { message } => {
                            Some(format!("{}: {}", f.destination, message))
                        }
                        _ => None,
                    })
                    .collect();
                if rejected.is_empty() {
                    None
                } else {
                    Some(rejected.join("; "))
                }
            }
            _ => None,
        }
    }

    /// 转换为报表用的扁平记录
    pub fn to_flat(&self) -> FlatUpdateResult {
        let (record_id, date_setting) = match &self.outcome {
            UpdateOutcome::Updated { record_id, date_setting, .. } => (
                Some(record_id.clone()),
                date_setting.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            _ => (None, None),
        };

        let fields = self
            .fields()
            .iter()
            .map(|f| format!("{}={}", f.destination, f.status.short()))
            .collect::<Vec<_>>()
            .join(";");

        FlatUpdateResult {
            substation: self.substation.clone().unwrap_or_default(),
            plant_number: self.device_name.clone(),
            type_pattern: self.type_pattern.clone(),
            result: self.status().label().to_string(),
            record_id: record_id.unwrap_or_default(),
            date_setting: date_setting.unwrap_or_default(),
            fields,
            error_detail: self.error_detail().unwrap_or_default(),
        }
    }
}

impl fmt::Display for UpdateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UpdateResult({}: {})", self.device_name, self.status())
    }
}

// ==========================================
// FlatUpdateResult - 报表行
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FlatUpdateResult {
    pub substation: String,
    pub plant_number: String,
    pub type_pattern: String,
    pub result: String,
    pub record_id: String,
    pub date_setting: String,
    pub fields: String,
    pub error_detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Region;

    fn device() -> ProtectionDevice {
        ProtectionDevice::new("h1", "NIP1A", "T1", Region::Energex).with_substation("ABC")
    }

    #[test]
    fn test_constructors_map_to_status() {
        let d = device();
        assert_eq!(UpdateResult::not_found_in_source(&d).status(), UpdateStatus::NotFoundInSource);
        assert_eq!(UpdateResult::type_unresolved(&d).status(), UpdateStatus::TypeUnresolved);
        assert_eq!(UpdateResult::failed(&d, "boom").status(), UpdateStatus::Failed);
        assert_eq!(UpdateResult::informational(&d, "skip").status(), UpdateStatus::Informational);
    }

    #[test]
    fn test_failed_keeps_device_context() {
        let result = UpdateResult::failed(&device(), "连接断开");
        match result.outcome {
            UpdateOutcome::Failed { error, device_context } => {
                assert_eq!(error, "连接断开");
                assert!(device_context.contains("NIP1A"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_partial_failure_flat_record() {
        let record = SettingRecord::new("42", "NIP1", "T1");
        let fields = vec![
            FieldOutcome {
                source_field: "Ipset".into(),
                destination: "e:Ipset".into(),
                status: FieldStatus::Written { value: SettingValue::Number(1.5) },
            },
            FieldOutcome {
                source_field: "Tpset".into(),
                destination: "e:Tpset".into(),
                status: FieldStatus::WriteRejected { message: "read only".into() },
            },
        ];
        let result = UpdateResult::updated(&device(), &record, fields, vec![]);

        assert_eq!(result.status(), UpdateStatus::Updated);
        assert!(result.has_partial_failure());

        let flat = result.to_flat();
        assert_eq!(flat.substation, "ABC");
        assert_eq!(flat.plant_number, "NIP1A");
        assert_eq!(flat.record_id, "42");
        assert_eq!(flat.result, "Updated Successfully");
        assert_eq!(flat.fields, "e:Ipset=ok;e:Tpset=rejected");
        assert_eq!(flat.error_detail, "e:Tpset: read only");
    }

    #[test]
    fn test_not_found_flat_record_is_sparse() {
        let flat = UpdateResult::not_found_in_source(&device()).to_flat();
        assert_eq!(flat.result, "Not in IPS");
        assert!(flat.record_id.is_empty());
        assert!(flat.fields.is_empty());
        assert!(flat.error_detail.is_empty());
    }
}
