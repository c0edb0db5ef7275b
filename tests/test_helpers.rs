// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时定值库、规则目录夹具、记录写入的内存模型
// ==========================================
#![allow(dead_code)]

use protection_settings_sync::db::init_schema;
use protection_settings_sync::domain::{DeviceHandle, ProtectionDevice, SettingValue, TypeDefinition};
use protection_settings_sync::engine::{ModelError, NetworkModel, WriteStatus};
use protection_settings_sync::rules::{CurveMapping, RuleStore};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::path::Path;
use tempfile::{NamedTempFile, TempDir};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().ok_or("路径非 UTF-8")?.to_string();

    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 插入一条定值记录及其字段（字段按给定顺序编号）
pub fn insert_setting(
    conn: &Connection,
    record_id: &str,
    region: &str,
    device_key: &str,
    switch_key: Option<&str>,
    type_pattern: &str,
    date_setting: Option<&str>,
    fields: &[(&str, &str)],
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT INTO setting_record (record_id, region, device_key, switch_key, type_pattern, date_setting, active, location_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL)",
        params![record_id, region, device_key, switch_key, type_pattern, date_setting],
    )?;
    for (seq, (name, value)) in fields.iter().enumerate() {
        conn.execute(
            "INSERT INTO setting_field (record_id, seq, field_name, value) VALUES (?1, ?2, ?3, ?4)",
            params![record_id, seq as i64, name, value],
        )?;
    }
    Ok(())
}

/// 写入配置项（scope_id='global'）
pub fn insert_config(conn: &Connection, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

// ==========================================
// 规则目录夹具
// ==========================================

/// 在临时目录中写出类型映射表与映射文件，返回目录（需保持存活）
///
/// # 参数
/// - types: (类型模式, 映射文件名, 映射文件内容；None 表示不创建文件)
pub fn create_rules_dir(types: &[(&str, &str, Option<&str>)]) -> Result<TempDir, Box<dyn Error>> {
    let dir = TempDir::new()?;
    let mut table = String::from("type_pattern,file_name,classification\n");
    for (pattern, file_name, content) in types {
        table.push_str(&format!("{},{},relay\n", pattern, file_name));
        if let Some(content) = content {
            fs::write(dir.path().join(format!("{}.csv", file_name)), content)?;
        }
    }
    fs::write(dir.path().join("type_mapping.csv"), table)?;
    Ok(dir)
}

pub fn load_rule_store(dir: &Path) -> RuleStore {
    RuleStore::load(&dir.join("type_mapping.csv"), dir, CurveMapping::default()).unwrap()
}

// ==========================================
// RecordingModel - 记录写入的内存模型
// ==========================================
#[derive(Default)]
pub struct RecordingModel {
    pub devices: Vec<ProtectionDevice>,
    pub types: Vec<TypeDefinition>,
    pub writes: Vec<(String, String, SettingValue)>, // (handle, attribute, value)
    pub failing_handles: HashSet<String>,            // 写入时返回模型故障
    pub read_only_attributes: HashSet<String>,       // 写入时拒绝
    pub cache_toggles: Vec<bool>,
    pub flushes: usize,
}

impl RecordingModel {
    pub fn new(devices: Vec<ProtectionDevice>, types: Vec<TypeDefinition>) -> Self {
        Self {
            devices,
            types,
            ..Self::default()
        }
    }

    pub fn failing(mut self, handle: &str) -> Self {
        self.failing_handles.insert(handle.to_string());
        self
    }

    pub fn read_only(mut self, attribute: &str) -> Self {
        self.read_only_attributes.insert(attribute.to_string());
        self
    }

    /// 某台设备收到的写入（按顺序）
    pub fn writes_to(&self, handle: &str) -> Vec<(&str, &SettingValue)> {
        self.writes
            .iter()
            .filter(|(h, _, _)| h == handle)
            .map(|(_, a, v)| (a.as_str(), v))
            .collect()
    }
}

impl NetworkModel for RecordingModel {
    fn devices(&self) -> Result<Vec<ProtectionDevice>, ModelError> {
        Ok(self.devices.clone())
    }

    fn type_library(&self) -> Result<Vec<TypeDefinition>, ModelError> {
        Ok(self.types.clone())
    }

    fn write(
        &mut self,
        handle: &DeviceHandle,
        attribute_path: &str,
        value: &SettingValue,
    ) -> Result<WriteStatus, ModelError> {
        if self.failing_handles.contains(handle.as_str()) {
            return Err(ModelError::Connection(format!("写入 {} 时连接断开", handle.as_str())));
        }
        if self.read_only_attributes.contains(attribute_path) {
            return Ok(WriteStatus::Rejected("只读属性".to_string()));
        }
        self.writes
            .push((handle.as_str().to_string(), attribute_path.to_string(), value.clone()));
        Ok(WriteStatus::Accepted)
    }

    fn set_write_cache(&mut self, enabled: bool) {
        self.cache_toggles.push(enabled);
    }

    fn flush(&mut self) -> Result<(), ModelError> {
        self.flushes += 1;
        Ok(())
    }
}
