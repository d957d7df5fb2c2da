//! 表ドキュメント
//!
//! 列設定・行の画像・セル値を保持する。解析パイプラインは
//! この表を借用してセルを書き込む。

mod attachment;
mod scanner;

pub use attachment::{detect_media_type, ImageAttachment};
pub use scanner::import_folder;

use crate::error::Result;
use scaflow_common::{build_row_prompt, targeted_columns, ColumnConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    /// 画像パス（表ファイルからの相対パス可）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    #[serde(skip)]
    pub image: Option<ImageAttachment>,

    /// 列index順のセル値
    pub cells: Vec<String>,

    /// 列index → 直近の解析エラー
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<usize, String>,
}

impl Row {
    pub fn with_image(image: ImageAttachment) -> Self {
        Self {
            image_path: Some(image.file_name.clone()),
            image: Some(image),
            ..Default::default()
        }
    }

    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    /// セル値を設定（足りない分は空セルで埋める）
    pub fn set_cell(&mut self, index: usize, content: impl Into<String>) {
        if self.cells.len() <= index {
            self.cells.resize(index + 1, String::new());
        }
        self.cells[index] = content.into();
    }

    pub fn error(&self, index: usize) -> Option<&str> {
        self.errors.get(&index).map(String::as_str)
    }

    pub fn set_error(&mut self, index: usize, error: impl Into<String>) {
        self.errors.insert(index, error.into());
    }

    pub fn clear_error(&mut self, index: usize) {
        self.errors.remove(&index);
    }

    /// 受け付け可能な画像が添付されているか
    pub fn has_accepted_image(&self) -> bool {
        self.image.as_ref().is_some_and(ImageAttachment::is_accepted)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Table {
    pub columns: Vec<ColumnConfig>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<ColumnConfig>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// 表ファイルを読み込み、画像を表ファイルのディレクトリ基準で解決する
    ///
    /// 読めない画像は警告のみ出して添付なしとする（その行は解析対象外）。
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut table: Table = serde_json::from_str(&content)?;

        let base_dir = path.parent().unwrap_or(Path::new("."));
        for (row_idx, row) in table.rows.iter_mut().enumerate() {
            let Some(image_path) = row.image_path.as_deref() else {
                continue;
            };

            let full_path = base_dir.join(image_path);
            match ImageAttachment::read(&full_path) {
                Ok(image) => row.image = Some(image),
                Err(e) => {
                    tracing::warn!(row = row_idx, path = %full_path.display(), "画像を読み込めません: {}", e);
                }
            }
        }

        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// 解析対象の列（プロンプトあり）
    pub fn targeted_columns(&self) -> Vec<ColumnConfig> {
        targeted_columns(&self.columns)
    }

    /// 1行分のリクエストに使われるプロンプト
    pub fn prompt(&self) -> String {
        build_row_prompt(&self.targeted_columns())
    }

    /// ヘッダ行（先頭は画像ファイル名）
    pub fn headers(&self) -> Vec<String> {
        std::iter::once("image".to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// 行ごとのセル値（ヘッダと同じ並び）
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                let image = row.image_path.clone().unwrap_or_default();
                std::iter::once(image)
                    .chain(self.columns.iter().map(|c| row.cell(c.index).to_string()))
                    .collect()
            })
            .collect()
    }
}
