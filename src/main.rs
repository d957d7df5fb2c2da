use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scaflow::{cli, config, error, export, table};
use scaflow::analyzer::HttpVisionClient;
use scaflow::common::ColumnConfig;
use scaflow::pipeline::{self, BatchEvent, BatchOptions, BatchRunner, ProcessingState};
use cli::{Cli, Commands};
use config::Config;
use error::ScaflowError;
use std::path::Path;
use std::time::Duration;
use table::Table;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scaflow={0},scaflow_common={0}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} セル {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn load_columns(path: &Path) -> anyhow::Result<Vec<ColumnConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("列設定を読み込めません: {}", path.display()))?;
    let mut columns: Vec<ColumnConfig> = serde_json::from_str(&content)
        .with_context(|| format!("列設定JSONが不正: {}", path.display()))?;

    // 列indexは並び順で振り直す
    for (i, column) in columns.iter_mut().enumerate() {
        column.index = i;
    }
    Ok(columns)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = Config::load()?;

    match cli.command {
        Commands::Init { folder, columns, output, recursive, include_all } => {
            println!("📋 scaflow - 表の作成\n");

            let columns = match columns {
                Some(path) => load_columns(&path)?,
                None => Vec::new(),
            };

            let table = table::import_folder(&folder, columns, include_all, recursive)?;
            let output = output.unwrap_or_else(|| folder.join("table.json"));
            table.save(&output)?;

            println!("✔ {}行 / {}列", table.rows.len(), table.columns.len());
            println!("✔ 表を保存: {}", output.display());
        }

        Commands::Run { table: table_path, output, concurrency, timeout, provider, model } => {
            println!("🚀 scaflow - 一括解析\n");

            let mut config = config;
            if let Some(provider) = provider {
                config.provider = provider;
            }
            if model.is_some() {
                config.model = model;
            }

            // 1. 表の読み込み
            println!("[1/3] 表を読み込み中...");
            let mut table = Table::load(&table_path)
                .with_context(|| format!("表を読み込めません: {}", table_path.display()))?;
            println!(
                "✔ {}行 / {}列（解析対象 {}列）\n",
                table.rows.len(),
                table.columns.len(),
                table.targeted_columns().len()
            );

            // 対象がなければAPIキーの確認より先に終了
            match pipeline::eligible_rows(&table) {
                Ok(_) => {}
                Err(ScaflowError::NothingToProcess) => {
                    println!("ℹ {}", ScaflowError::NothingToProcess);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            // 2. 解析
            let client = HttpVisionClient::from_config(&config)?;
            let options = BatchOptions {
                concurrency: concurrency.unwrap_or(config.concurrency).max(1),
                timeout: Duration::from_secs(timeout.unwrap_or(config.timeout_seconds)),
            };
            let runner = BatchRunner::new(client, options);

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\n中断要求を受け付けました。実行中の行が終わり次第停止します...");
                    ctrl_c.cancel();
                }
            });

            println!("[2/3] AI解析中... ({} / {})", config.provider, config.model());
            let bar = progress_bar();
            let mut sink = |event: &BatchEvent, state: &ProcessingState| match event {
                BatchEvent::Started { cells, .. } => bar.set_length(*cells as u64),
                BatchEvent::RowStarted { row, .. } => bar.set_message(format!("(行 {})", row + 1)),
                BatchEvent::RowFinished { row, error, .. } => {
                    bar.set_position(state.completed as u64);
                    if let Some(error) = error {
                        bar.println(format!("⚠ 行 {}: {}", row + 1, error));
                    }
                }
                BatchEvent::Finished(_) => bar.finish_and_clear(),
            };

            let mut state = ProcessingState::default();
            let summary = match runner.run(&mut table, &mut state, &mut sink, &cancel).await {
                Ok(summary) => summary,
                Err(ScaflowError::NothingToProcess) => {
                    bar.finish_and_clear();
                    println!("ℹ {}", ScaflowError::NothingToProcess);
                    return Ok(());
                }
                Err(e) => {
                    bar.finish_and_clear();
                    return Err(e.into());
                }
            };

            println!(
                "✔ 解析完了: {}/{} セル（書き込み {}、失敗した行 {}、対象外の行 {}）\n",
                summary.completed_cells,
                summary.total_cells,
                summary.written_cells,
                summary.failed_rows,
                summary.skipped_rows
            );
            if summary.cancelled {
                println!("⚠ 中断されたため、一部の行は未処理です\n");
            }

            // 3. 保存
            println!("[3/3] 結果を保存中...");
            let output = output.unwrap_or(table_path);
            table.save(&output)?;
            println!("✔ 表を保存: {}", output.display());

            println!("\n✅ 完了");
        }

        Commands::Prompt { table: table_path } => {
            let table = Table::load(&table_path)
                .with_context(|| format!("表を読み込めません: {}", table_path.display()))?;

            if table.targeted_columns().is_empty() {
                println!("プロンプト付きの列がありません");
            } else {
                println!("{}", table.prompt());
            }
        }

        Commands::Export { table: table_path, output, sheet } => {
            println!("📄 scaflow - エクスポート\n");

            let table = Table::load(&table_path)
                .with_context(|| format!("表を読み込めません: {}", table_path.display()))?;

            let output_path = match output {
                Some(output) => export::output_path_for(&output, &sheet),
                None => table_path.with_extension("xlsx"),
            };

            println!("- Excelを生成中...");
            export::export_xlsx(&table, &output_path, &sheet)?;
            println!("✔ Excel出力: {}", output_path.display());
        }

        Commands::Config { set_api_key, provider, model, show } => {
            let mut config = config;
            let mut changed = false;

            if let Some(provider) = provider {
                config.provider = provider;
                changed = true;
            }
            if let Some(model) = model {
                config.model = Some(model);
                changed = true;
            }
            if let Some(key) = set_api_key {
                config.set_api_key(&key);
                println!("✔ APIキーを設定しました");
                changed = true;
            }
            if changed {
                config.save()?;
            }

            if show || !changed {
                println!("設定: {}", Config::config_path()?.display());
                println!("  プロバイダ: {}", config.provider);
                println!("  モデル: {}", config.model());
                println!("  エンドポイント: {}", config.api_base());
                println!("  最大トークン: {}", config.max_tokens);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  同時実行数: {}", config.concurrency);
                println!(
                    "  APIキー: {}",
                    if config.get_api_key().is_ok() { "設定済み" } else { "未設定" }
                );
            }
        }
    }

    Ok(())
}
