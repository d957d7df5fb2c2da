//! 進捗通知

use super::state::{CellId, ProcessingState};

/// バッチ結果の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// 解析対象の行数
    pub eligible_rows: usize,
    /// 画像なし・画像以外で対象外になった行数
    pub skipped_rows: usize,
    pub total_cells: usize,
    pub completed_cells: usize,
    /// 空でない値を書き込んだセル数
    pub written_cells: usize,
    /// 行単位で失敗した行数（通信・タイムアウト・パース失敗）
    pub failed_rows: usize,
    pub cancelled: bool,
}

/// バッチ実行中のイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started {
        rows: usize,
        cells: usize,
    },
    RowStarted {
        row: usize,
        cells: Vec<CellId>,
    },
    RowFinished {
        row: usize,
        written: usize,
        error: Option<String>,
    },
    Finished(BatchSummary),
}

/// 進捗イベントの受け口
///
/// `state` はイベント発生時点の進捗（読み取り専用）。
pub trait ProgressSink {
    fn on_event(&mut self, event: &BatchEvent, state: &ProcessingState);
}

impl<F> ProgressSink for F
where
    F: FnMut(&BatchEvent, &ProcessingState),
{
    fn on_event(&mut self, event: &BatchEvent, state: &ProcessingState) {
        self(event, state)
    }
}

/// 何もしないSink
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_event(&mut self, _event: &BatchEvent, _state: &ProcessingState) {}
}
