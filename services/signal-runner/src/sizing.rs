//! Trade Parameter Calculator - exit levels, risk/reward and position size

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;
use crate::error::{EngineError, Result};
use crate::trade::TradeSide;

/// Levels and sizing for a prospective trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeParameters {
    pub side: TradeSide,
    pub entry_price: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub sl: f64,
    /// Notional in quote currency
    pub position_size: f64,
    /// Notional as percent of account balance
    pub position_percent: f64,
    pub risk_reward: f64,
    /// Balance fraction put at risk, in quote currency
    pub risk_amount: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TradeParameterCalculator {
    risk: RiskConfig,
}

impl TradeParameterCalculator {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    /// Compute levels for `side` entered at `entry_price`.
    ///
    /// Size is the notional whose stop-out loses `risk_per_trade` of the
    /// balance, capped at `max_position_pct` of the balance.
    pub fn calculate(&self, side: TradeSide, entry_price: f64) -> Result<TradeParameters> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(EngineError::InvalidState(format!(
                "Entry price must be positive, got {}",
                entry_price
            )));
        }

        let cfg = &self.risk;
        let (tp1, tp2, sl) = match side {
            TradeSide::Buy => (
                entry_price * (1.0 + cfg.tp1_pct),
                entry_price * (1.0 + cfg.tp2_pct),
                entry_price * (1.0 - cfg.sl_pct),
            ),
            TradeSide::Sell => (
                entry_price * (1.0 - cfg.tp1_pct),
                entry_price * (1.0 - cfg.tp2_pct),
                entry_price * (1.0 + cfg.sl_pct),
            ),
        };

        let risk = (entry_price - sl).abs();
        let reward = (tp1 - entry_price).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let risk_amount = cfg.account_balance * cfg.risk_per_trade;
        let cap = cfg.account_balance * cfg.max_position_pct;
        let position_size = if risk > 0.0 {
            (risk_amount / (risk / entry_price)).min(cap)
        } else {
            cap
        };

        Ok(TradeParameters {
            side,
            entry_price,
            tp1,
            tp2,
            sl,
            position_size,
            position_percent: position_size / cfg.account_balance * 100.0,
            risk_reward,
            risk_amount,
        })
    }
}
