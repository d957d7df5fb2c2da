//! 解析対象列の抽出と検証

use crate::error::{Error, Result};
use crate::types::ColumnConfig;
use std::collections::HashSet;

/// プロンプトを持つ列だけを入力順で返す
pub fn targeted_columns(columns: &[ColumnConfig]) -> Vec<ColumnConfig> {
    columns
        .iter()
        .filter(|c| c.wants_analysis())
        .cloned()
        .collect()
}

/// 解析対象列の列名と列indexを検証
///
/// 列名はレスポンスJSONのキー、列indexは結果とセルの対応に使う。
/// どちらかが空や重複だと値が取り違えられるため、解析前にエラーとして弾く。
pub fn validate_columns(columns: &[ColumnConfig]) -> Result<()> {
    let mut names = HashSet::new();
    let mut indices = HashSet::new();

    for column in columns.iter().filter(|c| c.wants_analysis()) {
        let name = column.name.trim();
        if name.is_empty() {
            return Err(Error::EmptyColumnName(column.index));
        }
        if !names.insert(name) {
            return Err(Error::DuplicateColumnName(name.to_string()));
        }
        if !indices.insert(column.index) {
            return Err(Error::DuplicateColumnIndex(column.index));
        }
    }

    Ok(())
}
