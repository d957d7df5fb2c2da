//! バッチ解析パイプライン
//!
//! 表の全行を走査し、画像付きの行ごとに1回ずつビジョンモデルを呼び出して
//! 結果をセルへ書き戻す。
//!
//! - Scanning: 対象列の検証と対象行の抽出（画像以外・画像なしの行は無視）
//! - Running: 対象行を表の順に投入。同時実行数は `BatchOptions::concurrency`。
//!   終わった行から枠を空け、結果は表の順に反映する
//! - 行単位の失敗（通信・タイムアウト・パース失敗）は他の行に影響しない
//! - キャンセルは行の投入前にのみ確認し、実行中の呼び出しは結果を捨てる

mod progress;
mod state;

pub use progress::{BatchEvent, BatchSummary, NoopSink, ProgressSink};
pub use state::{BatchPhase, CellId, ProcessingState};

use crate::analyzer::{analyze_row, VisionModel};
use crate::error::{Result, ScaflowError};
use crate::table::Table;
use futures::stream::{FuturesUnordered, StreamExt};
use scaflow_common::{validate_columns, ColumnConfig, RowAnalysisResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// 解析対象の行indexを表の順に返す
///
/// 対象列を検証し、画像付きの行とプロンプト付きの列が揃わなければ
/// `NothingToProcess` を返す。APIクライアントを用意する前の事前確認にも使う。
pub fn eligible_rows(table: &Table) -> Result<Vec<usize>> {
    let columns = table.targeted_columns();
    validate_columns(&columns)?;

    let eligible: Vec<usize> = if columns.is_empty() {
        Vec::new()
    } else {
        table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.has_accepted_image())
            .map(|(i, _)| i)
            .collect()
    };

    if eligible.is_empty() {
        tracing::info!(
            rows = table.rows.len(),
            columns = columns.len(),
            "解析対象がありません"
        );
        return Err(ScaflowError::NothingToProcess);
    }

    Ok(eligible)
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// 同時に呼び出す行数（1なら逐次）
    pub concurrency: usize,
    /// 1行あたりの呼び出しタイムアウト
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// 実行中フラグ。Dropで必ずIdleに戻す
struct PhaseGuard<'a> {
    phase: &'a AtomicU8,
}

impl<'a> PhaseGuard<'a> {
    fn acquire(phase: &'a AtomicU8) -> Result<Self> {
        phase
            .compare_exchange(
                BatchPhase::Idle.as_u8(),
                BatchPhase::Scanning.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ScaflowError::BatchInProgress)?;
        Ok(Self { phase })
    }

    fn set(&self, phase: BatchPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(BatchPhase::Idle.as_u8(), Ordering::Release);
    }
}

pub struct BatchRunner<M> {
    model: M,
    options: BatchOptions,
    phase: AtomicU8,
}

impl<M: VisionModel + Sync> BatchRunner<M> {
    pub fn new(model: M, options: BatchOptions) -> Self {
        Self {
            model,
            options,
            phase: AtomicU8::new(BatchPhase::Idle.as_u8()),
        }
    }

    pub fn phase(&self) -> BatchPhase {
        BatchPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// 表のスナップショットに対してバッチを実行
    ///
    /// # Errors
    /// * `BatchInProgress` - 同じRunnerで別のバッチが実行中
    /// * `InvalidColumns` - 対象列の列名が空、または列名・列indexが重複
    /// * `NothingToProcess` - 対象行または対象列がない（API呼び出しなし）
    ///
    /// 行単位の失敗はエラーにならず、セルのエラーと `BatchSummary::failed_rows` に反映される。
    pub async fn run<S: ProgressSink>(
        &self,
        table: &mut Table,
        state: &mut ProcessingState,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        let guard = PhaseGuard::acquire(&self.phase)?;
        state.reset();

        // Scanning
        let columns = table.targeted_columns();
        let eligible = eligible_rows(table)?;

        // Running
        guard.set(BatchPhase::Running);
        state.total = eligible.len() * columns.len();

        let mut summary = BatchSummary {
            eligible_rows: eligible.len(),
            skipped_rows: table.rows.len() - eligible.len(),
            total_cells: state.total,
            ..Default::default()
        };

        tracing::info!(
            rows = summary.eligible_rows,
            skipped = summary.skipped_rows,
            cells = summary.total_cells,
            concurrency = self.options.concurrency,
            "バッチ開始"
        );
        sink.on_event(
            &BatchEvent::Started {
                rows: summary.eligible_rows,
                cells: summary.total_cells,
            },
            state,
        );

        let concurrency = self.options.concurrency.max(1);
        let timeout = self.options.timeout;
        let model = &self.model;
        let columns_ref: &[ColumnConfig] = &columns;

        let mut queue = eligible.into_iter();
        let mut pending = FuturesUnordered::new();
        // 投入順（表の順）。結果はこの順でのみ反映する
        let mut launched = VecDeque::new();
        // 先頭の行を待っている結果。Noneはキャンセル後に返った結果
        let mut finished: BTreeMap<usize, Option<RowAnalysisResult>> = BTreeMap::new();

        loop {
            while pending.len() < concurrency && !cancel.is_cancelled() {
                let Some(row_idx) = queue.next() else {
                    break;
                };
                let Some(image) = table.rows[row_idx].image.clone() else {
                    continue;
                };

                let cells: Vec<CellId> = columns
                    .iter()
                    .map(|c| CellId::new(row_idx, c.index))
                    .collect();
                state.in_flight.extend(cells.iter().copied());
                sink.on_event(&BatchEvent::RowStarted { row: row_idx, cells }, state);

                launched.push_back(row_idx);
                pending.push(async move {
                    let result =
                        match tokio::time::timeout(timeout, analyze_row(model, &image, columns_ref)).await {
                            Ok(result) => result,
                            Err(_) => RowAnalysisResult::failed(
                                ScaflowError::Timeout(timeout).to_string(),
                            ),
                        };
                    (row_idx, result)
                });
            }

            let Some((row_idx, result)) = pending.next().await else {
                break;
            };
            finished.insert(row_idx, (!cancel.is_cancelled()).then_some(result));

            while let Some(&head) = launched.front() {
                let Some(result) = finished.remove(&head) else {
                    break;
                };
                launched.pop_front();
                finish_row(table, state, sink, &mut summary, head, &columns, result);
            }
        }

        summary.completed_cells = state.completed;
        summary.cancelled = cancel.is_cancelled() && state.completed < state.total;

        state.reset();
        drop(guard);

        tracing::info!(
            completed = summary.completed_cells,
            written = summary.written_cells,
            failed_rows = summary.failed_rows,
            cancelled = summary.cancelled,
            "バッチ終了"
        );
        sink.on_event(&BatchEvent::Finished(summary.clone()), state);

        Ok(summary)
    }
}

/// 返ってきた1行分の結果を反映し、RowFinishedを通知する
///
/// `result` がNoneならキャンセル済みとして結果を捨てる。
fn finish_row<S: ProgressSink>(
    table: &mut Table,
    state: &mut ProcessingState,
    sink: &mut S,
    summary: &mut BatchSummary,
    row_idx: usize,
    columns: &[ColumnConfig],
    result: Option<RowAnalysisResult>,
) {
    let Some(result) = result else {
        for column in columns {
            state.in_flight.remove(&CellId::new(row_idx, column.index));
        }
        tracing::debug!(row = row_idx, "キャンセル済みのため結果を破棄");
        sink.on_event(
            &BatchEvent::RowFinished {
                row: row_idx,
                written: 0,
                error: Some("cancelled".to_string()),
            },
            state,
        );
        return;
    };

    let written = apply_row_result(table, state, row_idx, columns, &result);
    summary.written_cells += written;
    if let Some(error) = &result.error {
        summary.failed_rows += 1;
        tracing::warn!(row = row_idx, "行の解析に失敗: {}", error);
    }

    sink.on_event(
        &BatchEvent::RowFinished {
            row: row_idx,
            written,
            error: result.error,
        },
        state,
    );
}

/// 1行分の結果をセルへ反映し、書き込んだセル数を返す
///
/// 空の値は既存のセルを上書きしない（「見つからない」で消さない）。
fn apply_row_result(
    table: &mut Table,
    state: &mut ProcessingState,
    row_idx: usize,
    columns: &[ColumnConfig],
    result: &RowAnalysisResult,
) -> usize {
    let row = &mut table.rows[row_idx];
    let mut written = 0;

    for column in columns {
        state.in_flight.remove(&CellId::new(row_idx, column.index));

        let column_result = result.get(column.index);
        let error = column_result
            .and_then(|r| r.error.as_deref())
            .or(result.error.as_deref());

        match (error, column_result) {
            (Some(error), _) => row.set_error(column.index, error),
            (None, Some(r)) if !r.content.is_empty() => {
                row.set_cell(column.index, r.content.as_str());
                row.clear_error(column.index);
                written += 1;
            }
            (None, _) => row.clear_error(column.index),
        }

        state.completed += 1;
    }

    written
}
