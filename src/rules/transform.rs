// ==========================================
// 保护定值同步系统 - 定值变换
// ==========================================
// 职责: 原始定值字符串 + 变换标签 → 写入值
// 无变换标签时: 整数 → Integer，小数 → Number，其余原样文本
// ==========================================

use crate::domain::mapping::{DisableCondition, ScaleOp, Transform};
use crate::domain::types::SettingValue;
use crate::rules::curve_mapping::CurveMapping;
use thiserror::Error;

/// 单字段变换错误（不致命，记为字段级结果）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("定值不是数值: {0}")]
    NotNumeric(String),

    #[error("定值不是整数: {0}")]
    NotInteger(String),

    #[error("除数为零")]
    DivideByZero,
}

/// 对原始定值应用变换
///
/// # 参数
/// - transform: 映射规则上的可选变换
/// - raw: 定值记录中的原始值
/// - curves: 曲线映射表（仅 curve 变换使用）
pub fn apply_transform(
    transform: Option<&Transform>,
    raw: &str,
    curves: &CurveMapping,
) -> Result<SettingValue, TransformError> {
    let value = raw.trim();
    match transform {
        None => Ok(infer_value(value)),
        Some(Transform::Text) => Ok(SettingValue::Text(value.to_string())),
        Some(Transform::Scale { op, operand }) => {
            let number = parse_number(value)?;
            scale(number, *op, *operand).map(SettingValue::Number)
        }
        Some(Transform::PercentToPerUnit) => Ok(SettingValue::Number(parse_number(value)? / 100.0)),
        Some(Transform::Curve) => Ok(SettingValue::Text(
            curves.lookup(value).unwrap_or(value).to_string(),
        )),
        Some(Transform::OnOff(condition)) => Ok(SettingValue::Integer(on_off(value, condition))),
        Some(Transform::Bits(positions)) => extract_bits(value, positions).map(SettingValue::Text),
    }
}

fn infer_value(value: &str) -> SettingValue {
    if let Ok(i) = value.parse::<i64>() {
        return SettingValue::Integer(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        if f.is_finite() {
            return SettingValue::Number(f);
        }
    }
    SettingValue::Text(value.to_string())
}

fn parse_number(value: &str) -> Result<f64, TransformError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| TransformError::NotNumeric(value.to_string()))
}

fn scale(value: f64, op: ScaleOp, operand: f64) -> Result<f64, TransformError> {
    match op {
        ScaleOp::Add => Ok(value + operand),
        ScaleOp::Subtract => Ok(value - operand),
        ScaleOp::Multiply => Ok(value * operand),
        ScaleOp::Divide if operand == 0.0 => Err(TransformError::DivideByZero),
        ScaleOp::Divide => Ok(value / operand),
    }
}

/// 投退量: 1 = 投入, 0 = 退出
fn on_off(value: &str, condition: &DisableCondition) -> i64 {
    if value.is_empty() {
        return match condition {
            DisableCondition::Values(v) if v.len() == 1 && v[0] == "on" => 0,
            _ => 1,
        };
    }

    match condition {
        DisableCondition::Bit(position) => {
            let digits = binary_digits(value);
            if digits.chars().any(|c| c != '0' && c != '1') {
                return 1;
            }
            match digits.chars().nth(*position) {
                Some('1') => 0,
                _ => 1,
            }
        }
        DisableCondition::Values(values) => {
            if values.iter().any(|v| v == &value.to_lowercase()) {
                1
            } else {
                0
            }
        }
    }
}

/// 去掉小数点、截断指数部分，得到按位判断用的数字串
fn binary_digits(value: &str) -> String {
    value
        .chars()
        .take_while(|c| *c != 'e' && *c != 'E')
        .filter(|c| *c != '.')
        .collect()
}

/// 从整数值中按位提取（位号自最低位起，0 起计）
fn extract_bits(value: &str, positions: &[usize]) -> Result<String, TransformError> {
    let number = value
        .parse::<u64>()
        .map_err(|_| TransformError::NotInteger(value.to_string()))?;
    Ok(positions
        .iter()
        .map(|&p| if p < 64 && (number >> p) & 1 == 1 { '1' } else { '0' })
        .collect())
}
