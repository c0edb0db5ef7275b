// ==========================================
// 保护定值同步系统 - 索引层
// ==========================================
// 职责: 运行开始前一次性构建的只读查找结构
// - SettingIndex: 定值记录多键索引
// - TypeResolver: 设备类型解析
// - AltNameTable: 开关别名表
// 红线: 构建完成后不可变；构建失败对整次运行是致命的
// ==========================================

pub mod alt_name;
pub mod setting_index;
pub mod type_resolver;

use crate::importer::ImportError;
use thiserror::Error;

pub use alt_name::{AltNameEntry, AltNameTable};
pub use setting_index::{
    base_switch_name, expand_device_name, SettingIndex, SettingIndexOptions, DEFAULT_EXCLUDED_PATTERNS,
};
pub use type_resolver::{TypeResolver, DEFAULT_TYPE_SUFFIXES};

/// 共享索引构建错误（致命，运行不产生任何设备结果）
#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("定值记录 ID 为空 (设备键: {device_key})")]
    EmptyRecordId { device_key: String },

    #[error("定值记录 ID 重复: {0}")]
    DuplicateRecordId(String),

    #[error("类型定义缺少类型模式: {name}")]
    EmptyTypePattern { name: String },

    #[error("别名表加载失败: {0}")]
    AltNameLoad(#[from] ImportError),
}

pub type IndexResult<T> = Result<T, IndexBuildError>;
