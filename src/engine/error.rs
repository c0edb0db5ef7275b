// ==========================================
// 保护定值同步系统 - 设备处理错误
// ==========================================
// 单台设备流水线内的错误，由编排器就地转为 Failed 结果，不向外传播
// ==========================================

use crate::engine::model::ModelError;
use crate::rules::RuleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("映射规则错误: {0}")]
    Rule(#[from] RuleError),

    #[error("模型写入故障: {0}")]
    Model(#[from] ModelError),

    #[error("处理异常中止: {0}")]
    Panicked(String),
}
