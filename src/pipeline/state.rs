use std::collections::BTreeSet;

/// セル位置（行, 列index）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    pub row: usize,
    pub column: usize,
}

impl CellId {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// バッチの進捗状態
///
/// 呼び出し側が所有し、パイプラインだけが書き込む。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingState {
    /// 予定セル数（対象行 × 対象列）
    pub total: usize,
    /// 処理済みセル数（成功・失敗を問わない）
    pub completed: usize,
    /// 解析中のセル
    pub in_flight: BTreeSet<CellId>,
}

impl ProcessingState {
    pub fn reset(&mut self) {
        self.total = 0;
        self.completed = 0;
        self.in_flight.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.total == 0 && self.completed == 0 && self.in_flight.is_empty()
    }

    pub fn is_in_flight(&self, row: usize, column: usize) -> bool {
        self.in_flight.contains(&CellId::new(row, column))
    }
}

/// バッチの状態遷移: Idle → Scanning → Running → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Scanning,
    Running,
}

impl BatchPhase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            BatchPhase::Idle => 0,
            BatchPhase::Scanning => 1,
            BatchPhase::Running => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => BatchPhase::Scanning,
            2 => BatchPhase::Running,
            _ => BatchPhase::Idle,
        }
    }
}
