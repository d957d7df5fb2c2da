use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScaflowError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`scaflow config --set-api-key YOUR_KEY` または環境変数 {0} で設定してください")]
    MissingApiKey(&'static str),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("列設定が不正: {0}")]
    InvalidColumns(#[from] scaflow_common::Error),

    #[error("解析対象がありません（画像付きの行とプロンプト付きの列が必要です）")]
    NothingToProcess,

    #[error("別のバッチを実行中です")]
    BatchInProgress,

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("タイムアウト: {0:?}以内に応答がありません")]
    Timeout(Duration),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),
}

impl ScaflowError {
    /// 再試行しても結果が変わらないエラーか
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ScaflowError::NothingToProcess
                | ScaflowError::InvalidColumns(_)
                | ScaflowError::MissingApiKey(_)
                | ScaflowError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ScaflowError>;
