// ==========================================
// 保护定值同步系统 - 外部网络模型接口
// ==========================================
// 职责: 枚举保护设备 / 提供类型库 / 单属性写入 / 批量写缓存开关
// 红线: 只有编排器（经规则库）写模型，一次一个属性
// ==========================================

use crate::domain::setting::{DeviceHandle, ProtectionDevice, TypeDefinition};
use crate::domain::types::SettingValue;
use thiserror::Error;

/// 模型故障（非字段级拒绝，设备记为失败）
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("设备不存在: {0}")]
    UnknownDevice(String),

    #[error("模型连接失败: {0}")]
    Connection(String),

    #[error("模型内部错误: {0}")]
    Internal(String),
}

/// 单次属性写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    Accepted,
    Rejected(String), // 模型拒绝（只读属性、越限等）
}

impl WriteStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteStatus::Accepted)
    }
}

// ==========================================
// NetworkModel Trait
// ==========================================
pub trait NetworkModel {
    /// 枚举本次运行的保护设备
    fn devices(&self) -> Result<Vec<ProtectionDevice>, ModelError>;

    /// 类型库（运行开始时读取一次）
    fn type_library(&self) -> Result<Vec<TypeDefinition>, ModelError>;

    /// 写入单个属性
    ///
    /// # 返回
    /// - Ok(Accepted / Rejected): 字段级结果
    /// - Err: 模型故障
    fn write(
        &mut self,
        handle: &DeviceHandle,
        attribute_path: &str,
        value: &SettingValue,
    ) -> Result<WriteStatus, ModelError>;

    /// 批量写缓存提示（不影响结果）
    fn set_write_cache(&mut self, enabled: bool);

    /// 提交缓存中的写入
    fn flush(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}
