// ==========================================
// 保护定值同步系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少定值库被其他进程占用时的偶发 busy 错误
// - 提供定值库 / 配置表的建表语句
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 仅用于启动时告警，不做自动迁移
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 定值库 + 配置表结构
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_scope (
    scope_id TEXT PRIMARY KEY,
    scope_type TEXT NOT NULL,
    scope_key TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(scope_type, scope_key)
);

INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
VALUES ('global', 'GLOBAL', 'global');

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS setting_record (
    record_id TEXT PRIMARY KEY,
    region TEXT NOT NULL,
    device_key TEXT NOT NULL,
    switch_key TEXT,
    type_pattern TEXT NOT NULL,
    date_setting TEXT,
    active INTEGER,
    location_path TEXT
);

CREATE INDEX IF NOT EXISTS idx_setting_record_region ON setting_record(region);

CREATE TABLE IF NOT EXISTS setting_field (
    record_id TEXT NOT NULL REFERENCES setting_record(record_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    field_name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (record_id, seq)
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表（幂等）并登记当前 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
