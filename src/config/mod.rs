// ==========================================
// 保护定值同步系统 - 配置层
// ==========================================
// 职责: 运行配置读取与类型化
// 存储: config_kv 表（与定值表同库）
// ==========================================

pub mod config_manager;
pub mod run_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigError, ConfigManager, ConfigResult};
pub use run_config::{default_db_path, RunConfig, DB_PATH_ENV};
