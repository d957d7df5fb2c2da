use super::{ImageAttachment, Row, Table};
use crate::error::{Result, ScaflowError};
use scaflow_common::ColumnConfig;
use std::path::Path;
use walkdir::WalkDir;

/// フォルダ内のファイルから表を作成（1ファイル = 1行）
///
/// 既定では画像ファイルのみ取り込む。`include_all` の場合は
/// 画像以外も行として追加する（解析時には対象外になる）。
pub fn import_folder(
    folder: &Path,
    columns: Vec<ColumnConfig>,
    include_all: bool,
    recursive: bool,
) -> Result<Table> {
    if !folder.is_dir() {
        return Err(ScaflowError::FolderNotFound(folder.display().to_string()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut rows = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if let Some(mut row) = import_row(folder, path, include_all) {
            row.cells = vec![String::new(); columns.len()];
            rows.push(row);
        }
    }

    Ok(Table { columns, rows })
}

/// 1ファイルを行に変換。読めないファイルは警告して取り込まない
fn import_row(folder: &Path, path: &Path, include_all: bool) -> Option<Row> {
    let mut image = match ImageAttachment::read(path) {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ファイルを読み込めません: {}", e);
            return None;
        }
    };

    if !include_all && !image.is_accepted() {
        tracing::debug!(path = %path.display(), media_type = %image.media_type, "画像以外をスキップ");
        return None;
    }

    // 表ファイルをフォルダ直下に置く前提で相対パスを保存
    image.file_name = path
        .strip_prefix(folder)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    Some(Row::with_image(image))
}
