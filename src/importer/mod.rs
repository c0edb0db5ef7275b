// ==========================================
// 保护定值同步系统 - 导入层
// ==========================================
// 职责: 读取表格文件（映射文件/类型映射表/别名表/曲线表/模型快照）
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod field_mapper;
pub mod file_parser;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use field_mapper::{parse_setting_date, FieldMapper};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRow, UniversalFileParser};
