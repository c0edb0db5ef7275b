// ==========================================
// 保护定值同步系统 - 映射规则模型
// ==========================================
// MappingEntry: 映射文件中的一行（源字段 → 目标属性 + 可选变换）
// Transform: 变换标签的解析结果
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// MappingEntry - 单条映射规则
// ==========================================
// 同一类型的所有设备在一次运行内只读共享
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub source_field: String,         // 定值记录中的字段名
    pub destination: String,          // 模型属性路径
    pub transform: Option<Transform>, // 可选变换
}

impl MappingEntry {
    pub fn new(source_field: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            destination: destination.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }
}

// ==========================================
// ScaleOp - 数值运算符
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ScaleOp {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(ScaleOp::Add),
            '-' => Some(ScaleOp::Subtract),
            '*' => Some(ScaleOp::Multiply),
            '/' => Some(ScaleOp::Divide),
            _ => None,
        }
    }

    fn symbol(&self) -> char {
        match self {
            ScaleOp::Add => '+',
            ScaleOp::Subtract => '-',
            ScaleOp::Multiply => '*',
            ScaleOp::Divide => '/',
        }
    }
}

// ==========================================
// DisableCondition - 投退判定条件
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisableCondition {
    Bit(usize),          // 二进制值的第 N 位为 1 表示退出
    Values(Vec<String>), // 值（小写）命中列表表示投入
}

// ==========================================
// Transform - 变换标签
// ==========================================
// 标签格式:
// - text                 去空白原样写入
// - *k | /k | +k | -k    数值运算
// - perc_pu              百分比 → 标幺值
// - curve                曲线名转换（曲线映射表）
// - onoff:<条件>          投退量（0/1）
// - bits:<位序列>         二进制位提取
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    Text,
    Scale { op: ScaleOp, operand: f64 },
    PercentToPerUnit,
    Curve,
    OnOff(DisableCondition),
    Bits(Vec<usize>),
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err("变换标签为空".to_string());
        }

        let lower = tag.to_lowercase();
        match lower.as_str() {
            "text" => return Ok(Transform::Text),
            "perc_pu" => return Ok(Transform::PercentToPerUnit),
            "curve" => return Ok(Transform::Curve),
            _ => {}
        }

        if let Some(cond) = tag.strip_prefix("onoff:") {
            return parse_disable_condition(cond).map(Transform::OnOff);
        }

        if let Some(bits) = tag.strip_prefix("bits:") {
            let positions: Option<Vec<usize>> = bits
                .trim()
                .chars()
                .map(|c| c.to_digit(10).map(|d| d as usize))
                .collect();
            return match positions {
                Some(p) if !p.is_empty() => Ok(Transform::Bits(p)),
                _ => Err(format!("位序列格式错误: {}", tag)),
            };
        }

        let mut chars = tag.chars();
        if let Some(op) = chars.next().and_then(ScaleOp::from_char) {
            let operand = chars
                .as_str()
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("运算数无法解析: {}", tag))?;
            return Ok(Transform::Scale { op, operand });
        }

        Err(format!("未知变换标签: {}", tag))
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Text => write!(f, "text"),
            Transform::Scale { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Transform::PercentToPerUnit => write!(f, "perc_pu"),
            Transform::Curve => write!(f, "curve"),
            Transform::OnOff(DisableCondition::Bit(n)) => write!(f, "onoff:{}", n),
            Transform::OnOff(DisableCondition::Values(v)) => write!(f, "onoff:[{}]", v.join(", ")),
            Transform::Bits(p) => {
                let digits: String = p.iter().map(|d| d.to_string()).collect();
                write!(f, "bits:{}", digits)
            }
        }
    }
}

/// 解析投退条件：整数为位号，"[a, b]" 为列表，否则为单值
fn parse_disable_condition(raw: &str) -> Result<DisableCondition, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("投退条件为空".to_string());
    }

    if let Ok(bit) = raw.parse::<usize>() {
        return Ok(DisableCondition::Bit(bit));
    }

    if raw.starts_with('[') && raw.ends_with(']') {
        let values: Vec<String> = raw
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|s| s.trim().trim_matches(|c| c == '\'' || c == '"').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if values.is_empty() {
            return Err(format!("投退条件列表为空: {}", raw));
        }
        return Ok(DisableCondition::Values(values));
    }

    Ok(DisableCondition::Values(vec![raw.to_lowercase()]))
}
