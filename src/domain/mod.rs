// ==========================================
// 保护定值同步系统 - 领域模型层
// ==========================================
// 职责: 定义定值记录、保护设备、映射规则、更新结果
// 红线: 不含文件/数据库访问,不含匹配与编排逻辑
// ==========================================

pub mod mapping;
pub mod setting;
pub mod types;
pub mod update_result;

// 重导出核心类型
pub use mapping::{DisableCondition, MappingEntry, ScaleOp, Transform};
pub use setting::{
    DeviceHandle, ProtectionDevice, ResolvedSetting, SettingRecord, TypeDefinition,
};
pub use types::{Region, SettingValue, UpdateStatus};
pub use update_result::{
    FieldOutcome, FieldStatus, FlatUpdateResult, UpdateOutcome, UpdateResult,
};
