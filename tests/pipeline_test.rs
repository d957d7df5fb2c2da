//! バッチ解析パイプラインの統合テスト
//!
//! ネットワークは使わず、ファイル名ごとに応答を返すモックモデルで検証する

use scaflow::analyzer::VisionModel;
use scaflow::common::{ColumnConfig, ColumnType, PARSE_FAILURE};
use scaflow::error::{Result, ScaflowError};
use scaflow::pipeline::{
    eligible_rows, BatchEvent, BatchOptions, BatchPhase, BatchRunner, CellId, NoopSink,
    ProcessingState,
};
use scaflow::table::{ImageAttachment, Row, Table};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Reply {
    Body(String),
    Fail(String),
    Hang,
}

#[derive(Default)]
struct MockModel {
    replies: HashMap<String, Reply>,
    delay: Duration,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    called_files: Mutex<Vec<String>>,
}

impl MockModel {
    fn new() -> Self {
        Self::default()
    }

    fn reply(mut self, file_name: &str, body: &str) -> Self {
        self.replies.insert(file_name.to_string(), Reply::Body(body.to_string()));
        self
    }

    fn fail(mut self, file_name: &str, message: &str) -> Self {
        self.replies.insert(file_name.to_string(), Reply::Fail(message.to_string()));
        self
    }

    fn hang(mut self, file_name: &str) -> Self {
        self.replies.insert(file_name.to_string(), Reply::Hang);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 特定のファイルだけ応答を遅らせる
    fn slow(mut self, file_name: &str, delay: Duration) -> Self {
        self.delays.insert(file_name.to_string(), delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn called_files(&self) -> Vec<String> {
        self.called_files.lock().unwrap().clone()
    }
}

impl VisionModel for MockModel {
    fn complete(
        &self,
        _prompt: &str,
        image: &ImageAttachment,
    ) -> impl Future<Output = Result<String>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called_files.lock().unwrap().push(image.file_name.clone());

        let reply = self
            .replies
            .get(&image.file_name)
            .cloned()
            .unwrap_or_else(|| Reply::Body("{}".to_string()));
        let delay = self
            .delays
            .get(&image.file_name)
            .copied()
            .unwrap_or(self.delay);

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Reply::Body(body) => Ok(body),
                Reply::Fail(message) => Err(ScaflowError::ApiCall(message)),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("{}".to_string())
                }
            }
        }
    }
}

fn image_row(file_name: &str) -> Row {
    Row::with_image(ImageAttachment::new(file_name, "image/jpeg", vec![0xFF, 0xD8, 0xFF]))
}

fn summary_table(rows: Vec<Row>) -> Table {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "Summary", ColumnType::Text).with_prompt("Describe the image"),
    ]);
    table.rows = rows;
    table
}

fn runner(model: MockModel) -> BatchRunner<MockModel> {
    BatchRunner::new(model, BatchOptions::default())
}

/// 画像ありの行と画像なしの行: 呼び出しは画像ありの1回のみ
#[tokio::test]
async fn test_row_without_image_is_skipped() {
    let mut table = summary_table(vec![image_row("a.jpg"), Row::default()]);
    table.rows[1].set_cell(0, "untouched");

    let runner = runner(MockModel::new().reply("a.jpg", r#"{"Summary": "a cat"}"#));
    let mut state = ProcessingState::default();
    let mut totals = Vec::new();
    let mut sink = |event: &BatchEvent, state: &ProcessingState| {
        if let BatchEvent::RowFinished { .. } = event {
            totals.push((state.total, state.completed));
        }
    };

    let summary = runner
        .run(&mut table, &mut state, &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.model().calls(), 1);
    assert_eq!(totals, vec![(1, 1)]);
    assert_eq!(summary.total_cells, 1);
    assert_eq!(summary.completed_cells, 1);
    assert_eq!(summary.skipped_rows, 1);
    assert_eq!(table.rows[0].cell(0), "a cat");
    assert_eq!(table.rows[1].cell(0), "untouched");
    assert!(table.rows[1].errors.is_empty());
}

/// 数値列と単一選択列を1回の呼び出しで埋める
#[tokio::test]
async fn test_two_columns_single_call() {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "Count", ColumnType::Number).with_prompt("How many animals?"),
        ColumnConfig::new(1, "Label", ColumnType::SingleSelect)
            .with_prompt("Which animal?")
            .with_categories(["cat", "dog"]),
    ]);
    table.rows.push(image_row("pets.jpg"));

    let runner = runner(MockModel::new().reply("pets.jpg", r#"{"Count":"3","Label":"dog"}"#));
    let mut state = ProcessingState::default();

    let summary = runner
        .run(&mut table, &mut state, &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.model().calls(), 1);
    assert_eq!(table.rows[0].cell(0), "3");
    assert_eq!(table.rows[0].cell(1), "dog");
    assert!(table.rows[0].errors.is_empty());
    assert_eq!(summary.written_cells, 2);
    assert_eq!(summary.failed_rows, 0);
}

/// 画像以外のファイルは呼び出し・進捗の対象外
#[tokio::test]
async fn test_non_image_file_is_skipped() {
    let pdf = ImageAttachment::new("scan.pdf", "application/pdf", b"%PDF".to_vec());
    let mut table = summary_table(vec![Row::with_image(pdf), image_row("b.jpg")]);

    let runner = runner(MockModel::new());
    let mut state = ProcessingState::default();

    let summary = runner
        .run(&mut table, &mut state, &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.model().called_files(), vec!["b.jpg"]);
    assert_eq!(summary.eligible_rows, 1);
    assert_eq!(summary.total_cells, 1);
}

/// 対象行がなければAPIを呼ばずに終了
#[tokio::test]
async fn test_nothing_to_process_without_images() {
    let mut table = summary_table(vec![Row::default(), Row::default()]);

    let runner = runner(MockModel::new());
    let mut state = ProcessingState::default();
    let mut events = 0;
    let mut sink = |_: &BatchEvent, _: &ProcessingState| events += 1;

    let result = runner
        .run(&mut table, &mut state, &mut sink, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ScaflowError::NothingToProcess)));
    assert_eq!(runner.model().calls(), 0);
    assert_eq!(events, 0);
    assert!(state.is_idle());
    assert_eq!(runner.phase(), BatchPhase::Idle);
}

/// プロンプト付きの列がなければAPIを呼ばずに終了
#[tokio::test]
async fn test_nothing_to_process_without_prompts() {
    let mut table = Table::new(vec![ColumnConfig::new(0, "Notes", ColumnType::Text)]);
    table.rows.push(image_row("a.jpg"));

    let runner = runner(MockModel::new());
    let result = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ScaflowError::NothingToProcess)));
    assert_eq!(runner.model().calls(), 0);
}

/// 列名の重複は解析前にエラー
#[tokio::test]
async fn test_duplicate_column_names_rejected() {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "Color", ColumnType::Text).with_prompt("main color"),
        ColumnConfig::new(1, "Color", ColumnType::Text).with_prompt("background color"),
    ]);
    table.rows.push(image_row("a.jpg"));

    let runner = runner(MockModel::new());
    let result = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ScaflowError::InvalidColumns(_))));
    assert_eq!(runner.model().calls(), 0);
    assert_eq!(runner.phase(), BatchPhase::Idle);
}

/// 列indexの重複は解析前にエラー（同じ結果が2列に割り当てられない）
#[tokio::test]
async fn test_duplicate_column_indices_rejected() {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "A", ColumnType::Text).with_prompt("a"),
        ColumnConfig::new(0, "B", ColumnType::Text).with_prompt("b"),
    ]);
    table.rows.push(image_row("a.jpg"));

    let runner = runner(MockModel::new().reply("a.jpg", r#"{"A": "x", "B": "y"}"#));
    let result = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ScaflowError::InvalidColumns(scaflow::common::Error::DuplicateColumnIndex(0)))
    ));
    assert_eq!(runner.model().calls(), 0);
    assert!(table.rows[0].cells.iter().all(String::is_empty));
    assert_eq!(runner.phase(), BatchPhase::Idle);
}

/// 事前確認: 対象行を表の順に返し、対象がなければNothingToProcess
#[test]
fn test_eligible_rows_precheck() {
    let table = summary_table(vec![image_row("a.jpg"), Row::default(), image_row("c.jpg")]);
    assert_eq!(eligible_rows(&table).unwrap(), vec![0, 2]);

    let empty = summary_table(vec![Row::default()]);
    assert!(matches!(eligible_rows(&empty), Err(ScaflowError::NothingToProcess)));

    let unprompted = {
        let mut table = Table::new(vec![ColumnConfig::new(0, "Notes", ColumnType::Text)]);
        table.rows.push(image_row("a.jpg"));
        table
    };
    assert!(matches!(eligible_rows(&unprompted), Err(ScaflowError::NothingToProcess)));
}

/// 1行の失敗は他の行に影響しない
#[tokio::test]
async fn test_row_failure_is_isolated() {
    let mut table = summary_table(vec![image_row("a.jpg"), image_row("b.jpg"), image_row("c.jpg")]);
    table.rows[1].set_cell(0, "previous");

    let model = MockModel::new()
        .reply("a.jpg", r#"{"Summary": "first"}"#)
        .fail("b.jpg", "API error 500")
        .reply("c.jpg", r#"{"Summary": "third"}"#);
    let runner = runner(model);
    let mut state = ProcessingState::default();

    let summary = runner
        .run(&mut table, &mut state, &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(runner.model().calls(), 3);
    assert_eq!(summary.failed_rows, 1);
    assert_eq!(summary.completed_cells, 3);
    assert_eq!(table.rows[0].cell(0), "first");
    assert_eq!(table.rows[1].cell(0), "previous");
    assert!(table.rows[1].error(0).unwrap().contains("API error 500"));
    assert_eq!(table.rows[2].cell(0), "third");
}

/// JSONでないレスポンスはセルを消さずにエラーを付ける
#[tokio::test]
async fn test_malformed_response_marks_parse_failure() {
    let mut table = summary_table(vec![image_row("a.jpg")]);
    table.rows[0].set_cell(0, "keep me");

    let runner = runner(MockModel::new().reply("a.jpg", "not-json"));
    let summary = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed_rows, 1);
    assert_eq!(table.rows[0].cell(0), "keep me");
    assert_eq!(table.rows[0].error(0), Some(PARSE_FAILURE));
}

/// 空の値は既存のセルを上書きしない
#[tokio::test]
async fn test_empty_content_does_not_overwrite() {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "A", ColumnType::Text).with_prompt("a"),
        ColumnConfig::new(1, "B", ColumnType::Text).with_prompt("b"),
    ]);
    let mut row = image_row("a.jpg");
    row.set_cell(0, "old a");
    row.set_cell(1, "old b");
    table.rows.push(row);

    let runner = runner(MockModel::new().reply("a.jpg", r#"{"A": "", "C": "ignored"}"#));
    let summary = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.written_cells, 0);
    assert_eq!(summary.failed_rows, 0);
    assert_eq!(table.rows[0].cell(0), "old a");
    assert_eq!(table.rows[0].cell(1), "old b");
    assert!(table.rows[0].errors.is_empty());
}

/// タイムアウトは行単位の失敗として扱い、次の行へ進む
#[tokio::test]
async fn test_timeout_is_row_failure() {
    let mut table = summary_table(vec![image_row("slow.jpg"), image_row("fast.jpg")]);

    let model = MockModel::new()
        .hang("slow.jpg")
        .reply("fast.jpg", r#"{"Summary": "ok"}"#);
    let options = BatchOptions {
        concurrency: 1,
        timeout: Duration::from_millis(100),
    };
    let runner = BatchRunner::new(model, options);

    let summary = runner
        .run(&mut table, &mut ProcessingState::default(), &mut NoopSink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.failed_rows, 1);
    assert_eq!(summary.completed_cells, 2);
    assert!(table.rows[0].error(0).unwrap().contains("タイムアウト"));
    assert_eq!(table.rows[1].cell(0), "ok");
}

/// 進捗は単調増加し、解析中セルは開始前と終了後に空
#[tokio::test]
async fn test_progress_is_monotonic_and_in_flight_drains() {
    let mut table = Table::new(vec![
        ColumnConfig::new(0, "A", ColumnType::Text).with_prompt("a"),
        ColumnConfig::new(2, "C", ColumnType::Text).with_prompt("c"),
    ]);
    table.rows = vec![image_row("1.jpg"), Row::default(), image_row("3.jpg")];

    let runner = runner(MockModel::new().fail("3.jpg", "boom"));
    let mut state = ProcessingState::default();
    assert!(state.in_flight.is_empty());

    let mut completed = Vec::new();
    let mut finished_state = None;
    let mut sink = |event: &BatchEvent, state: &ProcessingState| match event {
        BatchEvent::Started { rows, cells } => {
            assert_eq!((*rows, *cells), (2, 4));
            assert!(state.in_flight.is_empty());
        }
        BatchEvent::RowStarted { row, cells } => {
            assert_eq!(cells.len(), 2);
            assert!(state.is_in_flight(*row, 0));
            assert!(state.is_in_flight(*row, 2));
            completed.push(state.completed);
        }
        BatchEvent::RowFinished { row, .. } => {
            assert!(!state.is_in_flight(*row, 0));
            assert!(!state.is_in_flight(*row, 2));
            completed.push(state.completed);
        }
        BatchEvent::Finished(_) => finished_state = Some(state.clone()),
    };

    let summary = runner
        .run(&mut table, &mut state, &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(completed, vec![0, 2, 2, 4]);
    assert!(completed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(summary.completed_cells, summary.total_cells);
    assert!(finished_state.unwrap().is_idle());
    assert!(state.is_idle());
    assert_eq!(runner.phase(), BatchPhase::Idle);
}

/// 実行中はRunning、終了後はIdle
#[tokio::test]
async fn test_phase_transitions() {
    let mut table = summary_table(vec![image_row("a.jpg")]);
    let runner = runner(MockModel::new());
    assert_eq!(runner.phase(), BatchPhase::Idle);

    let mut phases = Vec::new();
    let mut sink = |event: &BatchEvent, _: &ProcessingState| {
        if let BatchEvent::RowStarted { .. } = event {
            phases.push(runner.phase());
        }
    };

    runner
        .run(&mut table, &mut ProcessingState::default(), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(phases, vec![BatchPhase::Running]);
    assert_eq!(runner.phase(), BatchPhase::Idle);
}

/// 同じRunnerで2つ目のバッチは開始できない
#[tokio::test]
async fn test_second_batch_rejected_while_running() {
    let mut first = summary_table(vec![image_row("a.jpg")]);
    let mut second = summary_table(vec![image_row("b.jpg")]);
    let runner = runner(MockModel::new().with_delay(Duration::from_millis(50)));

    let mut first_state = ProcessingState::default();
    let mut second_state = ProcessingState::default();
    let mut first_sink = NoopSink;
    let mut second_sink = NoopSink;
    let cancel = CancellationToken::new();

    let (first_result, second_result) = tokio::join!(
        runner.run(&mut first, &mut first_state, &mut first_sink, &cancel),
        runner.run(&mut second, &mut second_state, &mut second_sink, &cancel),
    );

    assert!(first_result.is_ok());
    assert!(matches!(second_result, Err(ScaflowError::BatchInProgress)));
    assert_eq!(runner.model().called_files(), vec!["a.jpg"]);

    // 終了後は再実行できる
    let again = runner
        .run(&mut second, &mut second_state, &mut NoopSink, &cancel)
        .await;
    assert!(again.is_ok());
}

/// 開始前にキャンセル済みなら呼び出さない
#[tokio::test]
async fn test_cancelled_before_start() {
    let mut table = summary_table(vec![image_row("a.jpg"), image_row("b.jpg")]);
    let runner = runner(MockModel::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut state = ProcessingState::default();
    let summary = runner
        .run(&mut table, &mut state, &mut NoopSink, &cancel)
        .await
        .unwrap();

    assert_eq!(runner.model().calls(), 0);
    assert!(summary.cancelled);
    assert_eq!(summary.completed_cells, 0);
    assert!(state.is_idle());
}

/// 実行中にキャンセルすると、実行中の行の結果は捨てて以降の行は投入しない
#[tokio::test]
async fn test_cancel_discards_in_flight_result() {
    let mut table = summary_table(vec![image_row("a.jpg"), image_row("b.jpg"), image_row("c.jpg")]);
    let model = MockModel::new()
        .reply("a.jpg", r#"{"Summary": "should be discarded"}"#)
        .with_delay(Duration::from_millis(20));
    let runner = runner(model);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut discarded = Vec::new();
    let mut sink = |event: &BatchEvent, _: &ProcessingState| match event {
        BatchEvent::RowStarted { row: 0, .. } => trigger.cancel(),
        BatchEvent::RowFinished { row, error, .. } => discarded.push((*row, error.clone())),
        _ => {}
    };

    let mut state = ProcessingState::default();
    let summary = runner
        .run(&mut table, &mut state, &mut sink, &cancel)
        .await
        .unwrap();

    assert_eq!(runner.model().called_files(), vec!["a.jpg"]);
    assert_eq!(discarded, vec![(0, Some("cancelled".to_string()))]);
    assert!(summary.cancelled);
    assert_eq!(table.rows[0].cell(0), "");
    assert!(state.in_flight.is_empty());
}

/// 並列実行でも各行は1回だけ呼ばれ、結果は表の順に反映される
#[tokio::test]
async fn test_concurrent_rows_apply_in_table_order() {
    let files = ["1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg"];
    let mut table = summary_table(files.iter().map(|f| image_row(f)).collect());

    let mut model = MockModel::new().with_delay(Duration::from_millis(10));
    for f in files {
        model = model.reply(f, &format!(r#"{{"Summary": "row {}"}}"#, f));
    }
    let options = BatchOptions {
        concurrency: 3,
        ..Default::default()
    };
    let runner = BatchRunner::new(model, options);

    let mut finished_rows = Vec::new();
    let mut max_in_flight_rows = 0;
    let mut sink = |event: &BatchEvent, state: &ProcessingState| match event {
        BatchEvent::RowStarted { .. } => {
            max_in_flight_rows = max_in_flight_rows.max(state.in_flight.len());
        }
        BatchEvent::RowFinished { row, .. } => finished_rows.push(*row),
        _ => {}
    };

    let summary = runner
        .run(&mut table, &mut ProcessingState::default(), &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(finished_rows, vec![0, 1, 2, 3, 4]);
    assert!(max_in_flight_rows <= 3);
    assert_eq!(summary.completed_cells, 5);

    let mut called = runner.model().called_files();
    called.sort();
    called.dedup();
    assert_eq!(called.len(), 5);

    for (i, f) in files.iter().enumerate() {
        assert_eq!(table.rows[i].cell(0), format!("row {}", f));
    }
    assert!(table.rows.iter().all(|r| r.errors.is_empty()));

    // in-flightのセルIDは(行, 列index)
    assert_eq!(CellId::new(1, 0), CellId { row: 1, column: 0 });
}

/// 遅い先頭行が返るのを待たず、空いた枠から次の行を投入する
#[tokio::test(start_paused = true)]
async fn test_slow_head_row_does_not_block_free_slots() {
    let files = ["slow.jpg", "1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg", "6.jpg"];
    let mut table = summary_table(files.iter().map(|f| image_row(f)).collect());

    let model = MockModel::new()
        .with_delay(Duration::from_millis(50))
        .slow("slow.jpg", Duration::from_millis(300));
    let options = BatchOptions {
        concurrency: 3,
        ..Default::default()
    };
    let runner = BatchRunner::new(model, options);

    let mut completed_at_start = Vec::new();
    let mut finished_rows = Vec::new();
    let mut sink = |event: &BatchEvent, state: &ProcessingState| match event {
        BatchEvent::RowStarted { .. } => completed_at_start.push(state.completed),
        BatchEvent::RowFinished { row, .. } => finished_rows.push(*row),
        _ => {}
    };

    let started = tokio::time::Instant::now();
    let summary = runner
        .run(&mut table, &mut ProcessingState::default(), &mut sink, &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // 全行が先頭行の反映より前に投入されている
    assert_eq!(completed_at_start, vec![0; 7]);
    assert!(elapsed < Duration::from_millis(350), "elapsed: {:?}", elapsed);
    assert_eq!(finished_rows, (0..7).collect::<Vec<_>>());
    assert_eq!(summary.completed_cells, 7);
}
