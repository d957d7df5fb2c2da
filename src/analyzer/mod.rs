//! 行解析
//!
//! 1行 = 1画像 = 1回のAPI呼び出し。対象列すべての指示を
//! 1つのプロンプトにまとめ、JSONレスポンスを列に割り当てる。

mod client;

pub use client::HttpVisionClient;

use crate::error::Result;
use crate::table::ImageAttachment;
use scaflow_common::{build_row_prompt, parse_row_response, ColumnConfig, ColumnType, RowAnalysisResult};
use std::future::Future;

/// ビジョンモデル呼び出し
///
/// プロンプトと画像を送り、レスポンス本文（JSON文字列のはず）を返す。
pub trait VisionModel {
    fn complete(
        &self,
        prompt: &str,
        image: &ImageAttachment,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// 1行分の画像を解析
///
/// 失敗しない。通信エラー等は `RowAnalysisResult::failed` として返す。
pub async fn analyze_row<M: VisionModel>(
    model: &M,
    image: &ImageAttachment,
    columns: &[ColumnConfig],
) -> RowAnalysisResult {
    let prompt = build_row_prompt(columns);
    tracing::debug!(
        file = %image.file_name,
        columns = columns.len(),
        prompt_len = prompt.len(),
        "行解析リクエスト"
    );

    match model.complete(&prompt, image).await {
        Ok(content) => {
            let result = parse_row_response(&content, columns);
            if let Some(error) = &result.error {
                let preview: String = content.chars().take(200).collect();
                tracing::warn!(file = %image.file_name, response = %preview, "{}", error);
            }
            result
        }
        Err(e) => {
            tracing::warn!(file = %image.file_name, "画像解析エラー: {}", e);
            RowAnalysisResult::failed(e.to_string())
        }
    }
}

/// 単一列の解析結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAnalysis {
    pub content: String,
    pub error: Option<String>,
}

/// 1つのプロンプトで画像を解析（列名は "Result"）
pub async fn analyze_image<M: VisionModel>(
    model: &M,
    image: &ImageAttachment,
    prompt: &str,
    column_type: ColumnType,
) -> ImageAnalysis {
    let columns = vec![ColumnConfig::new(0, "Result", column_type).with_prompt(prompt)];
    let result = analyze_row(model, image, &columns).await;

    if let Some(error) = result.error {
        return ImageAnalysis {
            content: String::new(),
            error: Some(error),
        };
    }

    ImageAnalysis {
        content: result
            .results
            .into_iter()
            .next()
            .map(|r| r.content)
            .unwrap_or_default(),
        error: None,
    }
}
