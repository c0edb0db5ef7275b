// ==========================================
// 保护定值同步系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 将定值库（IPS）中的保护定值匹配并下发到网络模型设备
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 导入层 - 表格文件与映射表
pub mod importer;

// 索引层 - 定值索引 / 类型索引 / 别名表
pub mod index;

// 规则层 - 映射规则与值变换
pub mod rules;

// 引擎层 - 匹配与编排
pub mod engine;

// 定值源 - 定值库读取
pub mod source;

// 配置层 - 运行配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 结果报表
pub mod report;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Region, SettingValue, UpdateStatus};

// 领域实体
pub use domain::{
    DeviceHandle, FieldOutcome, FieldStatus, FlatUpdateResult, MappingEntry, ProtectionDevice,
    SettingRecord, Transform, TypeDefinition, UpdateOutcome, UpdateResult,
};

// 索引
pub use index::{AltNameTable, IndexBuildError, SettingIndex, TypeResolver};

// 规则
pub use rules::{CurveMapping, RuleError, RuleStore};

// 引擎
pub use engine::{
    ModelError, NetworkModel, OrchestratorOptions, RunReport, RunSummary, TieBreakPolicy,
    UpdateOrchestrator, WriteStatus,
};

// 定值源
pub use source::{RetryPolicy, RetryingSource, SettingsQuery, SettingsSource, SqliteSettingsSource};

// 配置
pub use config::{ConfigManager, RunConfig};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "保护定值同步系统";
