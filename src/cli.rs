use clap::{Parser, Subcommand};
use crate::ai_provider::AiProvider;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scaflow")]
#[command(about = "画像付きの表をビジョンLLMで一括入力するツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像フォルダから表ファイルを作成（1画像 = 1行）
    Init {
        /// 画像フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// 列設定JSONファイル（ColumnConfigの配列）
        #[arg(short, long)]
        columns: Option<PathBuf>,

        /// 出力する表ファイル（デフォルト: 入力フォルダ/table.json）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,

        /// 画像以外のファイルも行として追加
        #[arg(long)]
        include_all: bool,
    },

    /// プロンプト付きの列を画像から一括抽出
    Run {
        /// 表ファイル
        #[arg(required = true)]
        table: PathBuf,

        /// 出力する表ファイル（デフォルト: 入力を上書き）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 同時に解析する行数
        #[arg(long)]
        concurrency: Option<usize>,

        /// 1行あたりのタイムアウト（秒）
        #[arg(long)]
        timeout: Option<u64>,

        /// AIプロバイダ
        #[arg(long)]
        provider: Option<AiProvider>,

        /// モデル名
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 1行分のリクエストに使われるプロンプトを表示
    Prompt {
        /// 表ファイル
        #[arg(required = true)]
        table: PathBuf,
    },

    /// 表をExcelに出力
    Export {
        /// 表ファイル
        #[arg(required = true)]
        table: PathBuf,

        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// シート名
        #[arg(short, long, default_value = "Table")]
        sheet: String,
    },

    /// 設定
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 既定のプロバイダを設定
        #[arg(long)]
        provider: Option<AiProvider>,

        /// 既定のモデルを設定
        #[arg(long)]
        model: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
