//! Trade model
//!
//! A trade is open until it carries a [`Closure`]. Status and result are
//! derived from the closure, so combinations like "active but won" cannot
//! be represented. On the wire the flat `status` / `result` form is used.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::signal::Signal;
use crate::sizing::TradeParameters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Active,
    HitTp1,
    HitTp2,
    HitSl,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeResult {
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TakeProfitLevel {
    Tp1,
    Tp2,
}

/// How a trade resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Win(TakeProfitLevel),
    Loss,
}

impl TradeOutcome {
    pub fn status(&self) -> TradeStatus {
        match self {
            TradeOutcome::Win(TakeProfitLevel::Tp1) => TradeStatus::HitTp1,
            TradeOutcome::Win(TakeProfitLevel::Tp2) => TradeStatus::HitTp2,
            TradeOutcome::Loss => TradeStatus::HitSl,
        }
    }

    pub fn result(&self) -> TradeResult {
        match self {
            TradeOutcome::Win(_) => TradeResult::Win,
            TradeOutcome::Loss => TradeResult::Loss,
        }
    }

    fn from_status(status: TradeStatus) -> Option<Self> {
        match status {
            TradeStatus::Active => None,
            TradeStatus::HitTp1 => Some(TradeOutcome::Win(TakeProfitLevel::Tp1)),
            TradeStatus::HitTp2 => Some(TradeOutcome::Win(TakeProfitLevel::Tp2)),
            TradeStatus::HitSl => Some(TradeOutcome::Loss),
        }
    }
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeOutcome::Win(TakeProfitLevel::Tp1) => write!(f, "win@tp1"),
            TradeOutcome::Win(TakeProfitLevel::Tp2) => write!(f, "win@tp2"),
            TradeOutcome::Loss => write!(f, "loss@sl"),
        }
    }
}

/// Terminal data of a resolved trade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closure {
    pub outcome: TradeOutcome,
    pub exit_price: f64,
    pub pnl: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TradeRecord", try_from = "TradeRecord")]
pub struct Trade {
    pub id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub sl: f64,
    pub position_size: f64,
    pub position_percent: f64,
    pub risk_reward: f64,
    pub confidence: f64,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
    closure: Option<Closure>,
}

impl Trade {
    /// New active trade from an actionable signal and its parameters
    pub fn open(
        symbol: &str,
        signal: &Signal,
        params: &TradeParameters,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let side = signal.action.side().ok_or_else(|| {
            EngineError::InvalidState("Cannot open a trade from a HOLD signal".to_string())
        })?;
        if side != params.side {
            return Err(EngineError::InvalidState(format!(
                "Signal is {} but parameters were computed for {}",
                side, params.side
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            entry_price: params.entry_price,
            tp1: params.tp1,
            tp2: params.tp2,
            sl: params.sl,
            position_size: params.position_size,
            position_percent: params.position_percent,
            risk_reward: params.risk_reward,
            confidence: signal.confidence,
            rationale: signal.rationale.clone(),
            created_at: now,
            closure: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.closure.is_none()
    }

    pub fn status(&self) -> TradeStatus {
        self.closure
            .map(|c| c.outcome.status())
            .unwrap_or(TradeStatus::Active)
    }

    pub fn result(&self) -> Option<TradeResult> {
        self.closure.map(|c| c.outcome.result())
    }

    pub fn closure(&self) -> Option<&Closure> {
        self.closure.as_ref()
    }

    pub fn pnl(&self) -> Option<f64> {
        self.closure.map(|c| c.pnl)
    }

    /// Pnl if the trade were closed at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        let units = self.position_size / self.entry_price;
        match self.side {
            TradeSide::Buy => (price - self.entry_price) * units,
            TradeSide::Sell => (self.entry_price - price) * units,
        }
    }

    /// Open pnl at `price`; `None` once resolved
    pub fn unrealized_pnl(&self, price: f64) -> Option<f64> {
        self.is_active().then(|| self.pnl_at(price))
    }

    /// Level hit by `price`, checking tp2 before tp1 before sl
    pub fn exit_at(&self, price: f64) -> Option<TradeOutcome> {
        if !self.is_active() {
            return None;
        }
        match self.side {
            TradeSide::Buy => {
                if price >= self.tp2 {
                    Some(TradeOutcome::Win(TakeProfitLevel::Tp2))
                } else if price >= self.tp1 {
                    Some(TradeOutcome::Win(TakeProfitLevel::Tp1))
                } else if price <= self.sl {
                    Some(TradeOutcome::Loss)
                } else {
                    None
                }
            }
            TradeSide::Sell => {
                if price <= self.tp2 {
                    Some(TradeOutcome::Win(TakeProfitLevel::Tp2))
                } else if price <= self.tp1 {
                    Some(TradeOutcome::Win(TakeProfitLevel::Tp1))
                } else if price >= self.sl {
                    Some(TradeOutcome::Loss)
                } else {
                    None
                }
            }
        }
    }

    /// Move to a terminal status. Fails if already resolved.
    pub(crate) fn close(
        &mut self,
        outcome: TradeOutcome,
        exit_price: f64,
        now: DateTime<Utc>,
    ) -> Result<Closure> {
        if let Some(existing) = self.closure {
            return Err(EngineError::InvalidState(format!(
                "Trade {} already resolved as {}",
                self.id, existing.outcome
            )));
        }

        let closure = Closure {
            outcome,
            exit_price,
            pnl: self.pnl_at(exit_price),
            completed_at: now,
        };
        self.closure = Some(closure);
        Ok(closure)
    }
}

/// Flat persisted form of [`Trade`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TradeRecord {
    id: Uuid,
    symbol: String,
    action: TradeSide,
    entry_price: f64,
    tp1: f64,
    tp2: f64,
    sl: f64,
    position_size: f64,
    position_percent: f64,
    risk_reward: f64,
    confidence: f64,
    rationale: String,
    created_at: DateTime<Utc>,
    status: TradeStatus,
    result: Option<TradeResult>,
    pnl: Option<f64>,
    exit_price: Option<f64>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<Trade> for TradeRecord {
    fn from(trade: Trade) -> Self {
        let status = trade.status();
        let result = trade.result();
        Self {
            id: trade.id,
            symbol: trade.symbol,
            action: trade.side,
            entry_price: trade.entry_price,
            tp1: trade.tp1,
            tp2: trade.tp2,
            sl: trade.sl,
            position_size: trade.position_size,
            position_percent: trade.position_percent,
            risk_reward: trade.risk_reward,
            confidence: trade.confidence,
            rationale: trade.rationale,
            created_at: trade.created_at,
            status,
            result,
            pnl: trade.closure.map(|c| c.pnl),
            exit_price: trade.closure.map(|c| c.exit_price),
            completed_at: trade.closure.map(|c| c.completed_at),
        }
    }
}

impl TryFrom<TradeRecord> for Trade {
    type Error = String;

    fn try_from(record: TradeRecord) -> std::result::Result<Self, Self::Error> {
        let closure = match TradeOutcome::from_status(record.status) {
            None => {
                if record.result.is_some() || record.completed_at.is_some() {
                    return Err(format!("trade {} is active but carries a result", record.id));
                }
                None
            }
            Some(outcome) => {
                if record.result != Some(outcome.result()) {
                    return Err(format!(
                        "trade {} status {:?} disagrees with result {:?}",
                        record.id, record.status, record.result
                    ));
                }
                match (record.exit_price, record.pnl, record.completed_at) {
                    (Some(exit_price), Some(pnl), Some(completed_at)) => Some(Closure {
                        outcome,
                        exit_price,
                        pnl,
                        completed_at,
                    }),
                    _ => {
                        return Err(format!(
                            "resolved trade {} is missing exit price, pnl or completion time",
                            record.id
                        ))
                    }
                }
            }
        };

        Ok(Trade {
            id: record.id,
            symbol: record.symbol,
            side: record.action,
            entry_price: record.entry_price,
            tp1: record.tp1,
            tp2: record.tp2,
            sl: record.sl,
            position_size: record.position_size,
            position_percent: record.position_percent,
            risk_reward: record.risk_reward,
            confidence: record.confidence,
            rationale: record.rationale,
            created_at: record.created_at,
            closure,
        })
    }
}
