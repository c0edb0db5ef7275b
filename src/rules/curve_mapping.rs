// ==========================================
// 保护定值同步系统 - 曲线映射表
// ==========================================
// 文件列: ips_curve, code, model_curve
// 数字代码按定值宽度左补零后比较（二进制曲线代码）
// ==========================================

use crate::importer::{FieldMapper, FileParser, UniversalFileParser};
use crate::rules::{RuleError, RuleResult};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveEntry {
    pub ips_curve: String,   // 定值库中的曲线名
    pub code: String,        // 曲线代码
    pub model_curve: String, // 模型中的曲线名
}

#[derive(Debug, Default, Clone)]
pub struct CurveMapping {
    entries: Vec<CurveEntry>,
}

impl CurveMapping {
    /// 加载曲线映射表（文件不存在时为空表）
    pub fn load(path: &Path) -> RuleResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "曲线映射表不存在，curve 变换将原样写入");
            return Ok(Self::default());
        }

        let malformed = |source| RuleError::Malformed {
            path: path.display().to_string(),
            source,
        };
        let rows = UniversalFileParser
            .parse_to_raw_records(path)
            .map_err(malformed)?;

        let mapper = FieldMapper;
        let entries = rows
            .iter()
            .enumerate()
            .map(|(i, row)| mapper.map_to_curve(row, i + 2))
            .collect::<Result<Vec<_>, _>>()
            .map_err(malformed)?;

        info!(path = %path.display(), entries = entries.len(), "曲线映射表加载完成");
        Ok(Self { entries })
    }

    pub fn from_entries(entries: Vec<CurveEntry>) -> Self {
        Self { entries }
    }

    /// 定值 → 模型曲线名（按表顺序取第一个命中）
    pub fn lookup(&self, setting_value: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| {
                let code = if is_numeric_code(&entry.code) {
                    format!("{:0>width$}", entry.code, width = setting_value.len())
                } else {
                    entry.code.clone()
                };
                code == setting_value
                    || (!entry.ips_curve.is_empty() && entry.ips_curve == setting_value)
            })
            .map(|entry| entry.model_curve.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_numeric_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_digit())
}
