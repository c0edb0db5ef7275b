// ==========================================
// 保护定值同步系统 - 配置管理器
// ==========================================
// 职责: 运行配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// 配置层错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置库访问失败: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("锁获取失败: {0}")]
    Lock(String),

    #[error("配置值无效 ({key}): {message}")]
    InvalidValue { key: String, message: String },

    #[error("配置快照序列化失败: {0}")]
    Snapshot(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 定值库文件路径（配置表与定值表同库）
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let guard = conn.lock().map_err(|e| ConfigError::Lock(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| ConfigError::Lock(e.to_string()))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入（覆盖）global scope 的配置值
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| ConfigError::Lock(e.to_string()))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取字符串配置，带默认值
    pub fn get_string_or(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 读取可解析配置；格式错误时告警并回落默认值
    pub fn get_parsed_or<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 读取布尔配置（1/0, true/false, yes/no）
    pub fn get_bool_or(&self, key: &str, default: bool) -> ConfigResult<bool> {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "y" => Ok(true),
            "0" | "false" | "no" | "n" => Ok(false),
            "" => Ok(default),
            _ => {
                tracing::warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 读取逗号分隔的列表配置；未配置时返回 None
    pub fn get_list(&self, key: &str) -> ConfigResult<Option<Vec<String>>> {
        Ok(self.get_config_value(key)?.map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }))
    }

    /// 获取所有 global 配置的快照（JSON，按键排序）
    ///
    /// # 用途
    /// - 运行开始时记录本次生效的配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| ConfigError::Lock(e.to_string()))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 区域
    pub const REGION: &str = "region";

    // 规则与参考表文件
    pub const TYPE_MAPPING_FILE: &str = "type_mapping_file";
    pub const RULES_DIR: &str = "rules_dir";
    pub const ALT_NAME_FILE: &str = "alt_name_file";
    pub const CURVE_MAPPING_FILE: &str = "curve_mapping_file";

    // 匹配
    pub const TIE_BREAK_POLICY: &str = "tie_break_policy";
    pub const EXCLUDED_PATTERNS: &str = "excluded_patterns"; // 逗号分隔
    pub const TYPE_SUFFIXES: &str = "type_suffixes";         // 逗号分隔

    // 写入
    pub const BATCH_WRITE_CACHE: &str = "batch_write_cache";
    pub const MARK_FAILED_OUT_OF_SERVICE: &str = "mark_failed_out_of_service";
    pub const OUT_OF_SERVICE_ATTRIBUTE: &str = "out_of_service_attribute";

    // 定值源重试
    pub const RETRY_MAX_ATTEMPTS: &str = "retry_max_attempts";
    pub const RETRY_INITIAL_BACKOFF_MS: &str = "retry_initial_backoff_ms";
    pub const RETRY_BACKOFF_MULTIPLIER: &str = "retry_backoff_multiplier";
    pub const RETRY_MAX_BACKOFF_MS: &str = "retry_max_backoff_ms";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_missing_key_is_none() {
        let config = manager();
        assert_eq!(config.get_config_value(config_keys::REGION).unwrap(), None);
        assert_eq!(config.get_string_or(config_keys::REGION, "Ergon").unwrap(), "Ergon");
    }

    #[test]
    fn test_set_overwrites() {
        let config = manager();
        config.set_config_value(config_keys::REGION, "Energex").unwrap();
        config.set_config_value(config_keys::REGION, "Ergon").unwrap();
        assert_eq!(
            config.get_config_value(config_keys::REGION).unwrap().as_deref(),
            Some("Ergon")
        );
    }

    #[test]
    fn test_malformed_number_falls_back() {
        let config = manager();
        config.set_config_value(config_keys::RETRY_MAX_ATTEMPTS, "many").unwrap();
        assert_eq!(config.get_parsed_or(config_keys::RETRY_MAX_ATTEMPTS, 3u32).unwrap(), 3);

        config.set_config_value(config_keys::RETRY_MAX_ATTEMPTS, " 5 ").unwrap();
        assert_eq!(config.get_parsed_or(config_keys::RETRY_MAX_ATTEMPTS, 3u32).unwrap(), 5);
    }

    #[test]
    fn test_bool_and_list() {
        let config = manager();
        config.set_config_value(config_keys::BATCH_WRITE_CACHE, "no").unwrap();
        assert!(!config.get_bool_or(config_keys::BATCH_WRITE_CACHE, true).unwrap());

        config.set_config_value(config_keys::TYPE_SUFFIXES, "_Energex, ,_Ergon").unwrap();
        assert_eq!(
            config.get_list(config_keys::TYPE_SUFFIXES).unwrap(),
            Some(vec!["_Energex".to_string(), "_Ergon".to_string()])
        );
        assert_eq!(config.get_list(config_keys::EXCLUDED_PATTERNS).unwrap(), None);
    }

    #[test]
    fn test_snapshot_sorted() {
        let config = manager();
        config.set_config_value("b", "2").unwrap();
        config.set_config_value("a", "1").unwrap();
        assert_eq!(config.get_config_snapshot().unwrap(), r#"{"a":"1","b":"2"}"#);
    }
}
