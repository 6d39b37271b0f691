//! Trade Lifecycle - single active trade, resolution, statistics, cooldown

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::config::LifecycleConfig;
use crate::error::{EngineError, Result};
use crate::signal::Signal;
use crate::sizing::TradeParameters;
use crate::stats::Statistics;
use crate::trade::{Trade, TradeOutcome};

/// Idle period after a resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownWindow {
    pub end: Option<DateTime<Utc>>,
}

impl CooldownWindow {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.end.map(|end| now < end).unwrap_or(false)
    }

    /// Time left, `None` once elapsed
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.end.filter(|end| now < *end).map(|end| end - now)
    }
}

/// Owns the active-trade slot, bounded history and statistics
#[derive(Debug, Clone)]
pub struct TradeLifecycleManager {
    symbol: String,
    cooldown_duration: Duration,
    history_limit: usize,
    active: Option<Trade>,
    /// Newest first
    history: VecDeque<Trade>,
    statistics: Statistics,
    cooldown: CooldownWindow,
}

impl TradeLifecycleManager {
    pub fn new(symbol: &str, config: &LifecycleConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            cooldown_duration: config.cooldown(),
            history_limit: config.history_limit.max(1),
            active: None,
            history: VecDeque::new(),
            statistics: Statistics::default(),
            cooldown: CooldownWindow::default(),
        }
    }

    pub fn active_trade(&self) -> Option<&Trade> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &VecDeque<Trade> {
        &self.history
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn cooldown(&self) -> CooldownWindow {
        self.cooldown
    }

    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown.is_active(now)
    }

    /// Create the active trade. Fails if one is already open or the signal is HOLD.
    pub fn open_trade(
        &mut self,
        signal: &Signal,
        params: &TradeParameters,
        now: DateTime<Utc>,
    ) -> Result<&Trade> {
        if let Some(active) = &self.active {
            return Err(EngineError::InvalidState(format!(
                "Trade {} is already active",
                active.id
            )));
        }

        let trade = Trade::open(&self.symbol, signal, params, now)?;
        info!(
            "Opened {} {} @ {:.4} (tp1 {:.4}, tp2 {:.4}, sl {:.4}, size {:.2})",
            trade.side, trade.symbol, trade.entry_price, trade.tp1, trade.tp2, trade.sl, trade.position_size
        );

        self.push_history(trade.clone());
        Ok(&*self.active.insert(trade))
    }

    /// Resolve the active trade if `price` reached one of its levels
    pub fn evaluate(&mut self, price: f64, now: DateTime<Utc>) -> Result<Option<Trade>> {
        let outcome = match self.active.as_ref().and_then(|t| t.exit_at(price)) {
            Some(outcome) => outcome,
            None => return Ok(None),
        };
        self.resolve(outcome, price, now).map(Some)
    }

    /// Close the active trade, record statistics and start the cooldown
    pub fn resolve(
        &mut self,
        outcome: TradeOutcome,
        exit_price: f64,
        now: DateTime<Utc>,
    ) -> Result<Trade> {
        let mut trade = self
            .active
            .take()
            .ok_or_else(|| EngineError::InvalidState("No active trade to resolve".to_string()))?;

        let closure = trade.close(outcome, exit_price, now)?;
        self.statistics.record(outcome.result(), closure.pnl);
        self.cooldown.end = Some(now + self.cooldown_duration);

        match self.history.iter_mut().find(|t| t.id == trade.id) {
            Some(entry) => *entry = trade.clone(),
            None => self.push_history(trade.clone()),
        }

        info!(
            "Resolved {} {} as {} @ {:.4}, pnl {:+.2}",
            trade.side, trade.symbol, outcome, exit_price, closure.pnl
        );
        Ok(trade)
    }

    /// Manual override: end the cooldown now
    pub fn clear_cooldown(&mut self) {
        self.cooldown = CooldownWindow::default();
    }

    /// Reinstate persisted state
    pub fn restore(
        &mut self,
        active: Option<Trade>,
        history: Vec<Trade>,
        statistics: Statistics,
        cooldown_end: Option<DateTime<Utc>>,
    ) {
        self.history = history.into_iter().take(self.history_limit).collect();
        self.statistics = statistics;
        self.cooldown = CooldownWindow { end: cooldown_end };
        self.active = match active {
            Some(trade) if trade.is_active() => Some(trade),
            Some(trade) => {
                warn!("Ignoring persisted active trade {} that is already resolved", trade.id);
                None
            }
            None => None,
        };
    }

    /// Drop the active trade, history, statistics and cooldown
    pub fn reset(&mut self) {
        self.active = None;
        self.history.clear();
        self.statistics = Statistics::default();
        self.cooldown = CooldownWindow::default();
    }

    fn push_history(&mut self, trade: Trade) {
        self.history.push_front(trade);
        self.history.truncate(self.history_limit);
    }
}
