//! Reconstructed trade records.

use super::event::{Outcome, Signal, TradeClose, TradeOpen};

/// Protective-stop activity observed while the trade was open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitManagement {
    pub break_even: bool,
    pub trailing_started: bool,
    pub trailing_moves: usize,
}

/// One open matched to one close.
///
/// `outcome` is the advisor's own tag and `profit` the reported amount; the
/// two are kept side by side because they occasionally disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub open: TradeOpen,
    pub close: TradeClose,
    pub signal: Option<Signal>,
    pub duration_secs: i64,
    pub outcome: Outcome,
    pub profit: f64,
    pub exits: ExitManagement,
}

impl Trade {
    pub fn new(open: TradeOpen, close: TradeClose, signal: Option<Signal>) -> Self {
        let duration_secs = (close.ts - open.ts).num_seconds();
        Trade {
            outcome: close.outcome,
            profit: close.profit,
            open,
            close,
            signal,
            duration_secs,
            exits: ExitManagement::default(),
        }
    }

    pub fn with_exits(mut self, exits: ExitManagement) -> Self {
        self.exits = exits;
        self
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.profit < 0.0
    }

    /// The WIN/LOSS tag contradicts the sign of the profit.
    pub fn is_label_mismatch(&self) -> bool {
        match self.outcome {
            Outcome::Win => self.profit < 0.0,
            Outcome::Loss => self.profit > 0.0,
        }
    }

    /// The close was logged before the open it was paired with.
    pub fn is_ordering_anomaly(&self) -> bool {
        self.duration_secs < 0
    }

    pub fn is_stop_loss_exit(&self) -> bool {
        self.close.reason.contains("Stop Loss") && self.is_loss()
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs as f64 / 60.0
    }

    pub fn ticket(&self) -> Option<u64> {
        self.open.ticket.or(self.close.ticket)
    }
}
