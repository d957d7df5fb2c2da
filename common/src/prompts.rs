//! プロンプト生成モジュール
//!
//! 列設定のリストから、1画像に対する抽出指示と
//! JSON出力形式をまとめた1つのプロンプトを組み立てる。

use crate::types::{ColumnConfig, ColumnType};

const PREAMBLE: &str = "Analyze this image and extract the following information. \
You must respond with a valid JSON object containing each analyzed field:";

const CLOSING: &str = "Do not include any explanation or anything other than the JSON object.";

/// 列の型ごとの書式指示
fn type_directive(column: &ColumnConfig) -> String {
    match column.column_type {
        ColumnType::Number => "Return ONLY the number without any additional text.".to_string(),
        ColumnType::Timestamp => "If you find a date or time, format it as YYYY-MM-DD HH:MM:SS. \
If only a date is visible, format as YYYY-MM-DD."
            .to_string(),
        ColumnType::SingleSelect if !column.categories.is_empty() => format!(
            "IMPORTANT: Only use these categories: {}. Do not create new categories.",
            column.category_names()
        ),
        ColumnType::SingleSelect => {
            "Provide a single category or label, preferably a single word or short phrase."
                .to_string()
        }
        ColumnType::MultiSelect if !column.categories.is_empty() => format!(
            "IMPORTANT: Only use these categories: {}. Do not create new categories. \
You may select multiple comma-separated values.",
            column.category_names()
        ),
        ColumnType::MultiSelect => {
            "Provide multiple categories or labels, separated by commas.".to_string()
        }
        ColumnType::Text => String::new(),
    }
}

/// 行解析用プロンプト生成
///
/// # Arguments
/// * `columns` - 解析対象の列（プロンプトありの列のみ渡すこと）
///
/// # Returns
/// 列ごとの指示とJSON出力形式を含むプロンプト文字列。
/// 列が空でもフィールドなしのプロンプトを返す。
pub fn build_row_prompt(columns: &[ColumnConfig]) -> String {
    let fields = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let directive = type_directive(column);
            let mut line = format!("Field {}: \"{}\" - {}", i + 1, column.name, column.prompt.trim());
            if !directive.is_empty() {
                line.push(' ');
                line.push_str(&directive);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");

    let skeleton = columns
        .iter()
        .map(|column| {
            // 列名はJSON文字列としてエスケープ
            let key = serde_json::to_string(&column.name).unwrap_or_else(|_| format!("\"{}\"", column.name));
            format!("  {}: \"The extracted value\"", key)
        })
        .collect::<Vec<_>>()
        .join(",\n");

    let skeleton = if skeleton.is_empty() {
        "{}".to_string()
    } else {
        format!("{{\n{}\n}}", skeleton)
    };

    format!(
        "{PREAMBLE}\n\n{fields}\n\nFormat your response as a JSON object with the following structure:\n{skeleton}\n\n{CLOSING}"
    )
}
