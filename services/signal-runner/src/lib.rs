//! Signal Runner Library
//!
//! Indicator-driven BUY/SELL/HOLD signals for one market, with exit levels,
//! a single tracked trade, cooldown and running statistics.

pub mod config;
pub mod error;
pub mod indicators;
pub mod lifecycle;
pub mod presenter;
pub mod runner;
pub mod signal;
pub mod sizing;
pub mod state;
pub mod stats;
pub mod trade;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use config::{
    LifecycleConfig, MarketConfig, RiskConfig, RunnerConfig, ScheduleConfig, SignalConfig,
    StorageConfig,
};
pub use error::{EngineError, Result};
pub use indicators::{IndicatorEngine, IndicatorSnapshot, Trend};
pub use lifecycle::{CooldownWindow, TradeLifecycleManager};
pub use presenter::{ActiveTradeView, DashboardView, LogPresenter, Presenter, StatisticsView};
pub use runner::{IndicatorTick, PriceTick, RunnerHandle, SignalTick, TradingOrchestrator};
pub use signal::{Signal, SignalAction, SignalAnalyzer};
pub use sizing::{TradeParameterCalculator, TradeParameters};
pub use state::{JsonStateStore, PersistedState, StateStore};
pub use stats::Statistics;
pub use trade::{Closure, TakeProfitLevel, Trade, TradeOutcome, TradeResult, TradeSide, TradeStatus};
