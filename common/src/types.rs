//! 列設定と解析結果の型定義
//!
//! - ColumnConfig: 列の型・カテゴリ・抽出プロンプト
//! - ColumnResult: 1列分の抽出結果
//! - RowAnalysisResult: 1行（1画像）分の抽出結果

use serde::{de::Deserializer, Deserialize, Serialize};
use std::fmt;

/// 列の型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Timestamp,
    SingleSelect,
    MultiSelect,
}

impl ColumnType {
    /// 文字列から列の型を判定（未知の型はText扱い）
    pub fn parse(s: &str) -> Self {
        let norm: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match norm.as_str() {
            "number" | "numeric" => ColumnType::Number,
            "timestamp" | "date" | "datetime" => ColumnType::Timestamp,
            "singleselect" | "select" => ColumnType::SingleSelect,
            "multiselect" => ColumnType::MultiSelect,
            _ => ColumnType::Text,
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, ColumnType::SingleSelect | ColumnType::MultiSelect)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Timestamp => "timestamp",
            ColumnType::SingleSelect => "singleSelect",
            ColumnType::MultiSelect => "multiSelect",
        };
        f.write_str(name)
    }
}

// 旧データや手書きJSONの表記揺れを吸収する
impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ColumnType::parse(&s))
    }
}

/// 選択肢（singleSelect / multiSelect 用）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub name: String,
    pub color: String,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// 列設定
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnConfig {
    /// 列位置（1回の行解析内で列を識別する）
    pub index: usize,
    /// 列名（JSONキーとして使用）
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// 抽出指示。空の場合は解析対象外
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,
}

impl ColumnConfig {
    pub fn new(index: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            index,
            name: name.into(),
            column_type,
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_categories<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = names
            .into_iter()
            .map(|n| Category::new(n, String::new()))
            .collect();
        self
    }

    /// 解析対象の列か（プロンプトが空でない）
    pub fn wants_analysis(&self) -> bool {
        !self.prompt.trim().is_empty()
    }

    /// カテゴリ名をカンマ区切りで返す
    pub fn category_names(&self) -> String {
        self.categories
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 1列分の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnResult {
    /// 入力列のindexをそのまま返す
    pub index: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnResult {
    pub fn found(index: usize, content: impl Into<String>) -> Self {
        Self {
            index,
            content: content.into(),
            error: None,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

/// 1行分の抽出結果
///
/// `error` が設定されている場合は行全体の失敗。
/// 呼び出し側は対象列すべてを失敗として扱う。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowAnalysisResult {
    pub results: Vec<ColumnResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowAnalysisResult {
    /// 行全体の失敗（resultsは空）
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// 列indexで結果を取得
    pub fn get(&self, index: usize) -> Option<&ColumnResult> {
        self.results.iter().find(|r| r.index == index)
    }
}
