//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Column name is empty (column {0})")]
    EmptyColumnName(usize),

    #[error("Duplicate column name: {0}")]
    DuplicateColumnName(String),

    #[error("Duplicate column index: {0}")]
    DuplicateColumnIndex(usize),

    #[error("Export error: {0}")]
    Export(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
