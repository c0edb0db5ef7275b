// ==========================================
// 保护定值同步系统 - 引擎层
// ==========================================
// 职责: 设备匹配与定值下发编排
// 红线: 不读文件、不访问定值库；模型写入只经编排器
// ==========================================

pub mod error;
pub mod matching;
pub mod model;
pub mod orchestrator;
pub mod snapshot_model;

// 重导出核心类型
pub use error::DeviceError;
pub use matching::{
    extract_plant_number, strategy_for, IdentityNameStrategy, MatchingStrategy,
    PlantNumberStrategy, TieBreak, TieBreakPolicy,
};
pub use model::{ModelError, NetworkModel, WriteStatus};
pub use orchestrator::{OrchestratorOptions, RunReport, RunSummary, UpdateOrchestrator};
pub use snapshot_model::{RecordedWrite, SnapshotModel};
