//! APIレスポンスパーサー
//!
//! ビジョンモデルのレスポンスからJSONオブジェクトを取り出し、
//! 列名をキーとして各列の値に割り当てる。

use crate::types::{ColumnConfig, ColumnResult, RowAnalysisResult};
use serde_json::{Map, Value};

/// JSONパース失敗時の列エラー
pub const PARSE_FAILURE: &str = "parse failure";

/// JSONパース失敗時の行エラー
pub const ROW_PARSE_FAILURE: &str = "failed to parse JSON response from model";

/// レスポンスからJSONオブジェクト部分を抽出
///
/// 抽出優先順位:
/// 1. ```json ... ``` ブロック
/// 2. 最初の `{` から最後の `}` まで
///
/// # Examples
/// ```
/// use scaflow_common::extract_json_object;
///
/// let response = "Result: {\"Color\": \"red\"} done";
/// assert_eq!(extract_json_object(response), Some("{\"Color\": \"red\"}"));
/// ```
pub fn extract_json_object(response: &str) -> Option<&str> {
    if let Some(start_marker) = response.find("```json") {
        let start = start_marker + 7; // "```json" の長さ
        if let Some(end_offset) = response[start..].find("```") {
            return Some(response[start..start + end_offset].trim());
        }
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end >= start {
        Some(&response[start..=end])
    } else {
        None
    }
}

fn parse_object(content: &str) -> Option<Map<String, Value>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Some(Map::new());
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }

    match serde_json::from_str::<Value>(extract_json_object(trimmed)?) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// JSON値をセル文字列へ変換
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(stringify)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// 行解析レスポンスをパース
///
/// 失敗しない。JSONとして解釈できない場合は全列を
/// `content: ""`, `error: "parse failure"` とし、行エラーも設定する。
/// キーが存在しない列は「見つからなかった」扱いで、エラーにはしない。
///
/// # Arguments
/// * `content` - モデルのレスポンス本文
/// * `columns` - リクエストに含めた列
pub fn parse_row_response(content: &str, columns: &[ColumnConfig]) -> RowAnalysisResult {
    let Some(parsed) = parse_object(content) else {
        return RowAnalysisResult {
            results: columns
                .iter()
                .map(|c| ColumnResult::failed(c.index, PARSE_FAILURE))
                .collect(),
            error: Some(ROW_PARSE_FAILURE.to_string()),
        };
    };

    let results = columns
        .iter()
        .map(|column| {
            let content = parsed
                .get(&column.name)
                .map(stringify)
                .unwrap_or_default();
            ColumnResult::found(column.index, content)
        })
        .collect();

    RowAnalysisResult {
        results,
        error: None,
    }
}
