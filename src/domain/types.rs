// ==========================================
// 保护定值同步系统 - 领域类型定义
// ==========================================
// 区域 / 更新状态 / 定值写入值
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 区域 (Region)
// ==========================================
// 决定命名规则与匹配策略，每次运行只选一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Region {
    Energex, // 开关名命名（SEQ）
    Ergon,   // 资产编号命名（区域电网）
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Energex => "Energex",
            Region::Ergon => "Ergon",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    /// 支持标准名与别名（SEQ/EX → Energex, EE/REG → Ergon）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENERGEX" | "SEQ" | "EX" => Ok(Region::Energex),
            "ERGON" | "EE" | "REG" => Ok(Region::Ergon),
            other => Err(format!("未知区域: {}", other)),
        }
    }
}

// ==========================================
// 更新状态 (Update Status)
// ==========================================
// 每台设备的终态，一台设备只产生一个结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Updated,          // 已下发（可能含部分字段写入失败）
    NotFoundInSource, // 定值库中无匹配记录
    TypeUnresolved,   // 设备类型无映射规则
    Failed,           // 处理过程异常
    Informational,    // 仅提示，未尝试写入
}

impl UpdateStatus {
    /// 两类"未找到"终态
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpdateStatus::NotFoundInSource | UpdateStatus::TypeUnresolved)
    }

    /// 报表中的结果文字
    pub fn label(&self) -> &'static str {
        match self {
            UpdateStatus::Updated => "Updated Successfully",
            UpdateStatus::NotFoundInSource => "Not in IPS",
            UpdateStatus::TypeUnresolved => "Not mapped",
            UpdateStatus::Failed => "Script Failed",
            UpdateStatus::Informational => "Info",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Updated => write!(f, "UPDATED"),
            UpdateStatus::NotFoundInSource => write!(f, "NOT_FOUND_IN_SOURCE"),
            UpdateStatus::TypeUnresolved => write!(f, "TYPE_UNRESOLVED"),
            UpdateStatus::Failed => write!(f, "FAILED"),
            UpdateStatus::Informational => write!(f, "INFORMATIONAL"),
        }
    }
}

// ==========================================
// 写入值 (Setting Value)
// ==========================================
// 经变换后写入模型属性的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Integer(v) => Some(*v as f64),
            SettingValue::Number(v) => Some(*v),
            SettingValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Integer(v) => write!(f, "{}", v),
            SettingValue::Number(v) => write!(f, "{}", v),
            SettingValue::Text(s) => write!(f, "{}", s),
        }
    }
}
