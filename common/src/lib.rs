//! ScaFlow Common Library
//!
//! 列設定・プロンプト生成・レスポンス解析など、I/Oを持たない共通ロジック

pub mod types;
pub mod columns;
pub mod error;
pub mod media;
pub mod parser;
pub mod prompts;
pub mod export;

pub use types::{Category, ColumnConfig, ColumnResult, ColumnType, RowAnalysisResult};
pub use columns::{targeted_columns, validate_columns};
pub use error::{Error, Result};
pub use media::{is_accepted_media_type, media_type_for_extension};
pub use parser::{extract_json_object, parse_row_response, PARSE_FAILURE};
pub use prompts::build_row_prompt;
