// ==========================================
// 保护定值同步系统 - 定值记录与保护设备模型
// ==========================================
// SettingRecord: 定值库（IPS）中的一条定值记录
// ProtectionDevice: 网络模型中的一台保护设备
// TypeDefinition: 模型类型库中的设备类型描述
// ==========================================

use crate::domain::types::Region;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// SettingRecord - 定值记录
// ==========================================
// 构造后不可变，由 SettingIndex 独占持有
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    // ===== 标识 =====
    pub record_id: String,          // 定值记录 ID（relaysettingid）
    pub device_key: String,         // 设备标识键（资产名 / 设备编号）
    pub switch_key: Option<String>, // 开关标识键，可能是组合名（如 "NIP1A+B"）

    // ===== 类型 =====
    pub type_pattern: String, // 定值模式名（patternname）

    // ===== 定值内容 =====
    pub fields: IndexMap<String, String>, // 字段名 → 原始值（保持源顺序）

    // ===== 元信息 =====
    pub date_setting: Option<NaiveDateTime>, // 定值日期
    pub active: Option<bool>,                // 是否生效（仅 Ergon 提供）
    pub location_path: Option<String>,       // 位置路径（仅 Energex 提供）
}

impl SettingRecord {
    pub fn new(
        record_id: impl Into<String>,
        device_key: impl Into<String>,
        type_pattern: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            device_key: device_key.into(),
            switch_key: None,
            type_pattern: type_pattern.into(),
            fields: IndexMap::new(),
            date_setting: None,
            active: None,
            location_path: None,
        }
    }

    pub fn with_switch_key(mut self, switch_key: impl Into<String>) -> Self {
        self.switch_key = Some(switch_key.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_date(mut self, date_setting: NaiveDateTime) -> Self {
        self.date_setting = Some(date_setting);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn with_location_path(mut self, location_path: impl Into<String>) -> Self {
        self.location_path = Some(location_path.into());
        self
    }

    /// 读取源字段原始值
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// 未提供 active 时视为生效
    pub fn is_active(&self) -> bool {
        self.active != Some(false)
    }

    /// 位置路径第三段为变电站代码（"/Region/Area/SUB/..."）
    pub fn substation_segment(&self) -> Option<&str> {
        let path = self.location_path.as_deref()?;
        let parts: Vec<&str> = path.split('/').collect();
        parts.get(2).map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}

// ==========================================
// DeviceHandle - 模型对象句柄
// ==========================================
// 由外部模型枚举时给出，写入时原样回传
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub String);

impl DeviceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ==========================================
// ResolvedSetting - 匹配后选用的定值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSetting {
    pub record_id: String,
    pub date_setting: Option<NaiveDateTime>,
}

// ==========================================
// ProtectionDevice - 保护设备
// ==========================================
// 生命周期: 仅在单次运行内
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionDevice {
    pub handle: DeviceHandle,
    pub name: String,               // 模型中的设备名
    pub type_pattern: String,       // 设备类型模式
    pub region: Region,             // 所属区域
    pub substation: Option<String>, // 变电站代码（可选）
    pub settings: Option<ResolvedSetting>, // 匹配后填充
}

impl ProtectionDevice {
    pub fn new(
        handle: impl Into<String>,
        name: impl Into<String>,
        type_pattern: impl Into<String>,
        region: Region,
    ) -> Self {
        Self {
            handle: DeviceHandle(handle.into()),
            name: name.into(),
            type_pattern: type_pattern.into(),
            region,
            substation: None,
            settings: None,
        }
    }

    pub fn with_substation(mut self, substation: impl Into<String>) -> Self {
        self.substation = Some(substation.into());
        self
    }

    /// 设备全部属性（用于失败诊断日志）
    pub fn diagnostic_context(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

// ==========================================
// TypeDefinition - 设备类型定义
// ==========================================
// 运行开始时从模型类型库构建一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,                // 类型名（模型中的 loc_name）
    pub pattern: String,             // 满足的类型模式（映射规则的键）
    pub attributes: BTreeSet<String>, // 暴露的属性路径
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            attributes: BTreeSet::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// 属性集为空表示类型库未声明属性，不做校验
    pub fn exposes(&self, attribute_path: &str) -> bool {
        self.attributes.is_empty() || self.attributes.contains(attribute_path)
    }
}
