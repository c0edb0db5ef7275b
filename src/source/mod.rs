// ==========================================
// 保护定值同步系统 - 定值源层
// ==========================================
// 职责: 从定值库读取定值记录（异步接口 + 重试包装）
// 红线: 不含匹配逻辑，不写模型
// ==========================================

pub mod settings_source;
pub mod sqlite_source;

// 重导出核心类型
pub use settings_source::{
    RetryPolicy, RetryingSource, SettingsQuery, SettingsSource, SourceError, SourceResult,
};
pub use sqlite_source::SqliteSettingsSource;
