//! ScaFlow
//!
//! 表の各行に添付された画像をビジョンLLMに送り、プロンプト付きの列を一括で埋める。

pub mod ai_provider;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod table;

pub use scaflow_common as common;
