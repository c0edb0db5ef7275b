// ==========================================
// 保护定值同步系统 - SQLite 定值源
// ==========================================
// 表: setting_record（记录头）+ setting_field（有序字段）
// 红线: 只读，不含匹配逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::setting::SettingRecord;
use crate::importer::parse_setting_date;
use crate::source::settings_source::{SettingsQuery, SettingsSource, SourceError, SourceResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub struct SqliteSettingsSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettingsSource {
    /// 打开定值库
    pub fn new(db_path: &str) -> SourceResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| SourceError::Connection(format!("{}: {}", db_path, e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> SourceResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SourceError::Connection(format!("锁获取失败: {}", e)))
    }

    fn load(&self, query: &SettingsQuery) -> SourceResult<Vec<SettingRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT record_id, device_key, switch_key, type_pattern,
                   date_setting, active, location_path
            FROM setting_record
            WHERE region = ?1
            ORDER BY rowid ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![query.region.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(rows.len());

        for (record_id, device_key, switch_key, type_pattern, date_raw, active, location_path) in rows {
            let mut record = SettingRecord::new(record_id, device_key, type_pattern);
            record.switch_key = switch_key.filter(|s| !s.trim().is_empty());
            record.location_path = location_path.filter(|s| !s.trim().is_empty());
            record.active = active.map(|v| v != 0);

            if let Some(raw) = date_raw.as_deref().filter(|s| !s.trim().is_empty()) {
                record.date_setting = parse_setting_date(raw);
                if record.date_setting.is_none() {
                    warn!(record_id = %record.record_id, value = %raw, "定值日期无法解析，按无日期处理");
                }
            }

            if !query.includes(&record) {
                continue;
            }
            positions.insert(record.record_id.clone(), records.len());
            records.push(record);
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT f.record_id, f.field_name, f.value
            FROM setting_field f
            JOIN setting_record r ON r.record_id = f.record_id
            WHERE r.region = ?1
            ORDER BY f.record_id ASC, f.seq ASC
            "#,
        )?;
        let fields = stmt
            .query_map(params![query.region.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        for (record_id, field_name, value) in fields {
            if let Some(&pos) = positions.get(&record_id) {
                records[pos].fields.insert(field_name, value);
            }
        }

        debug!(region = %query.region, records = records.len(), "定值记录读取完成");
        Ok(records)
    }
}

#[async_trait]
impl SettingsSource for SqliteSettingsSource {
    async fn fetch(&self, query: &SettingsQuery) -> SourceResult<Vec<SettingRecord>> {
        self.load(query)
    }
}
