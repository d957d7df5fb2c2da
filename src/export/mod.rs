//! 表のExcel出力

use crate::error::{Result, ScaflowError};
use crate::table::Table;
use scaflow_common::export::excel_core::{generate_excel_buffer, SheetData};
use std::path::{Path, PathBuf};

impl SheetData for Table {
    fn headers(&self) -> Vec<String> {
        Table::headers(self)
    }

    fn records(&self) -> Vec<Vec<String>> {
        Table::records(self)
    }
}

/// 出力パスを決定（ディレクトリ指定ならファイル名を補う）
pub fn output_path_for(output: &Path, title: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.xlsx", title))
    } else {
        output.to_path_buf()
    }
}

pub fn export_xlsx(table: &Table, output_path: &Path, sheet_name: &str) -> Result<()> {
    let buffer = generate_excel_buffer(table, sheet_name)
        .map_err(|e| ScaflowError::ExcelGeneration(e.to_string()))?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, buffer)?;
    Ok(())
}
