// ==========================================
// 保护定值同步系统 - 结果报表
// ==========================================
// 输出: 每台设备一行的 CSV（列见 FlatUpdateResult）
// ==========================================

use crate::domain::update_result::{FlatUpdateResult, UpdateResult};
use crate::importer::error::{ImportError, ImportResult};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// 将结果写入任意输出
pub fn write_results<W: Write>(writer: W, results: &[UpdateResult]) -> ImportResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    if results.is_empty() {
        // 空结果也输出表头
        csv_writer
            .write_record(FLAT_HEADERS)
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
    }

    for result in results {
        let row: FlatUpdateResult = result.to_flat();
        csv_writer
            .serialize(&row)
            .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
    }

    csv_writer
        .flush()
        .map_err(|e| ImportError::CsvWriteError(e.to_string()))?;
    Ok(())
}

/// 将结果写入 CSV 文件
pub fn write_results_csv(path: &Path, results: &[UpdateResult]) -> ImportResult<()> {
    let file = std::fs::File::create(path)?;
    write_results(file, results)?;
    info!(path = %path.display(), rows = results.len(), "结果报表已写出");
    Ok(())
}

const FLAT_HEADERS: [&str; 8] = [
    "SUBSTATION",
    "PLANT_NUMBER",
    "TYPE_PATTERN",
    "RESULT",
    "RECORD_ID",
    "DATE_SETTING",
    "FIELDS",
    "ERROR_DETAIL",
];
