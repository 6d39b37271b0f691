//! Aggregate performance statistics

use serde::{Deserialize, Serialize};

use crate::trade::TradeResult;

/// Running totals over resolved trades. Only [`Statistics::default`] resets them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub total_pnl: f64,
    /// Consecutive wins, reset by any loss
    pub current_streak: u32,
    pub best_streak: u32,
    pub max_win: f64,
    /// Most negative loss pnl (zero until the first loss)
    pub max_loss: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl Statistics {
    pub fn record(&mut self, result: TradeResult, pnl: f64) {
        self.total_trades += 1;
        self.total_pnl += pnl;

        match result {
            TradeResult::Win => {
                self.winning_trades += 1;
                self.current_streak += 1;
                self.best_streak = self.best_streak.max(self.current_streak);
                self.max_win = self.max_win.max(pnl);

                let n = self.winning_trades as f64;
                self.avg_win = (self.avg_win * (n - 1.0) + pnl) / n;
            }
            TradeResult::Loss => {
                self.current_streak = 0;
                self.max_loss = self.max_loss.min(pnl);

                let n = self.losing_trades() as f64;
                self.avg_loss = (self.avg_loss * (n - 1.0) + pnl) / n;
            }
        }
    }

    pub fn losing_trades(&self) -> u32 {
        self.total_trades - self.winning_trades
    }

    /// Percent of resolved trades that won, 0 when none resolved
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }
}
