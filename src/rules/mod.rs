// ==========================================
// 保护定值同步系统 - 映射规则层
// ==========================================
// 职责: 类型映射表 → 映射文件 → 映射规则；规则应用到设备
// 缓存: 运行级（随 RuleStore 创建与销毁），不跨运行
// ==========================================

pub mod curve_mapping;
pub mod rule_store;
pub mod transform;

use crate::importer::ImportError;
use thiserror::Error;

pub use curve_mapping::{CurveEntry, CurveMapping};
pub use rule_store::{CacheStats, RuleStore, TypeMappingEntry};
pub use transform::{apply_transform, TransformError};

/// 映射规则错误
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("类型映射表不存在: {0}")]
    TypeMappingNotFound(String),

    #[error("映射文件不存在 (类型 {type_pattern}): {path}")]
    RuleFileNotFound { type_pattern: String, path: String },

    #[error("映射文件 {path} 第 {row} 行变换标签无法识别: {message}")]
    UnknownTransform {
        path: String,
        row: usize,
        message: String,
    },

    #[error("文件解析失败 ({path}): {source}")]
    Malformed {
        path: String,
        #[source]
        source: ImportError,
    },
}

pub type RuleResult<T> = Result<T, RuleError>;
