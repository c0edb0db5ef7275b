// ==========================================
// 保护定值同步系统 - 表格文件解析器
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls)
// 输出: 按文件行序排列的 HashMap<列名, 值>
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// 一行表格数据（列名 → 去空白后的值）
pub type RawRow = HashMap<String, String>;

// ==========================================
// FileParser Trait
// ==========================================
pub trait FileParser: Send + Sync {
    /// 解析文件为原始行记录（保持文件行序，跳过全空行）
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致（映射文件的变换列可省略）
            .trim(csv::Trim::All)
            .from_reader(file);

        // 读取表头（去除 UTF-8 BOM）
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row_map = HashMap::new();

            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    row_map.insert(header.clone(), value.trim().to_string());
                }
            }

            // 跳过完全空白的行
            if row_map.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(row_map);
        }

        Ok(records)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 只读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut records = Vec::new();
        for data_row in rows {
            let mut row_map = HashMap::new();

            for (col_idx, cell) in data_row.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    row_map.insert(header.clone(), cell.to_string().trim().to_string());
                }
            }

            if row_map.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(row_map);
        }

        Ok(records)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_records(&self, file_path: &Path) -> ImportResult<Vec<RawRow>> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.parse_to_raw_records(file_path),
            "xlsx" | "xls" => ExcelParser.parse_to_raw_records(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
