// ==========================================
// 保护定值同步系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 覆盖: 映射文件 / 类型映射表 / 别名表 / 曲线表 / 模型快照
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("CSV 写入失败: {0}")]
    CsvWriteError(String),

    // ===== 数据映射错误 =====
    #[error("必填列缺失 (行 {row}): {field}")]
    MissingColumn { row: usize, field: String },

    #[error("字段映射失败 (行 {row}): {message}")]
    FieldMappingError { row: usize, message: String },

    #[error("类型转换失败 (行 {row}, 字段 {field}): {message}")]
    TypeConversionError {
        row: usize,
        field: String,
        message: String,
    },
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
