//! Runner Configuration
//!
//! Layered with the `config` crate: an optional file (`signal-runner.toml`,
//! `.yaml` or `.json`, path overridable via `SIGNAL_RUNNER_CONFIG`) under
//! environment variables such as `SIGNAL_RUNNER__RISK__SL_PCT=0.012`.
//! Every field has a default.

use market_data::TimeFrame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::indicators::MIN_CANDLES;

/// Environment variable naming the config file (without extension)
pub const CONFIG_PATH_ENV: &str = "SIGNAL_RUNNER_CONFIG";
const DEFAULT_CONFIG_NAME: &str = "signal-runner";
const ENV_PREFIX: &str = "SIGNAL_RUNNER";

/// Complete runner configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub market: MarketConfig,
    pub risk: RiskConfig,
    pub signal: SignalConfig,
    pub lifecycle: LifecycleConfig,
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
}

/// What to watch and where to fetch it
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    pub symbol: String,
    pub timeframe: TimeFrame,
    /// Candles requested per indicator refresh
    pub candle_limit: usize,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: TimeFrame::Hour1,
            candle_limit: 100,
            base_url: market_data::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Position sizing and exit levels. Percentages are fractions (0.015 = 1.5%).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    pub account_balance: f64,
    /// Fraction of balance put at risk per trade
    pub risk_per_trade: f64,
    pub tp1_pct: f64,
    pub tp2_pct: f64,
    pub sl_pct: f64,
    /// Hard cap on notional as a fraction of balance
    pub max_position_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_balance: 10_000.0,
            risk_per_trade: 0.02,
            tp1_pct: 0.015,
            tp2_pct: 0.03,
            sl_pct: 0.012,
            max_position_pct: 0.25,
        }
    }
}

/// Decision thresholds and confidence heuristics
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub neutral_low: f64,
    pub neutral_high: f64,
    /// Annualized volatility (percent) above which confidence is penalized
    pub high_volatility: f64,
    /// Short/long SMA divergence (percent) that classifies a trend
    pub trend_threshold: f64,
    /// Added when price sits near the favorable side of the range
    pub position_bonus: f64,
    /// Confidence multiplier in high volatility
    pub volatility_penalty: f64,
    pub extreme_base_confidence: f64,
    pub range_confidence: f64,
    pub neutral_confidence: f64,
    pub hold_confidence: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            neutral_low: 45.0,
            neutral_high: 55.0,
            high_volatility: 8.0,
            trend_threshold: 0.5,
            position_bonus: 0.05,
            volatility_penalty: 0.8,
            extreme_base_confidence: 0.7,
            range_confidence: 0.65,
            neutral_confidence: 0.6,
            hold_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub cooldown_secs: u64,
    /// Trades kept in history (oldest evicted)
    pub history_limit: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 180,
            history_limit: 50,
        }
    }
}

impl LifecycleConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }
}

/// Tick intervals in seconds
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub price_secs: u64,
    pub signal_secs: u64,
    pub indicator_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            price_secs: 10,
            signal_secs: 60,
            indicator_secs: 300,
        }
    }
}

impl ScheduleConfig {
    pub fn price_interval(&self) -> Duration {
        Duration::from_secs(self.price_secs)
    }

    pub fn signal_interval(&self) -> Duration {
        Duration::from_secs(self.signal_secs)
    }

    pub fn indicator_interval(&self) -> Duration {
        Duration::from_secs(self.indicator_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let state_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signal-runner");
        Self { state_dir }
    }
}

impl RunnerConfig {
    /// Load from the optional config file and `SIGNAL_RUNNER__*` env vars
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_NAME.to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: RunnerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk;
        if risk.account_balance <= 0.0 {
            return Err(invalid("risk.account_balance must be positive"));
        }
        if !(0.0..=1.0).contains(&risk.risk_per_trade) || risk.risk_per_trade == 0.0 {
            return Err(invalid("risk.risk_per_trade must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&risk.max_position_pct) || risk.max_position_pct == 0.0 {
            return Err(invalid("risk.max_position_pct must be in (0, 1]"));
        }
        if risk.tp1_pct <= 0.0 || risk.tp2_pct <= 0.0 || risk.sl_pct <= 0.0 {
            return Err(invalid("risk.tp1_pct, tp2_pct and sl_pct must be positive"));
        }
        if risk.sl_pct >= 1.0 || risk.tp1_pct >= 1.0 || risk.tp2_pct >= 1.0 {
            return Err(invalid("risk percentages must be below 1.0"));
        }
        if risk.tp2_pct < risk.tp1_pct {
            return Err(invalid("risk.tp2_pct must not be below risk.tp1_pct"));
        }

        let signal = &self.signal;
        if signal.rsi_period < 2 {
            return Err(invalid("signal.rsi_period must be at least 2"));
        }
        if signal.rsi_oversold >= signal.rsi_overbought {
            return Err(invalid("signal.rsi_oversold must be below signal.rsi_overbought"));
        }
        if signal.neutral_low > signal.neutral_high
            || signal.neutral_low < signal.rsi_oversold
            || signal.neutral_high > signal.rsi_overbought
        {
            return Err(invalid(
                "signal neutral band must lie within [rsi_oversold, rsi_overbought]",
            ));
        }
        if signal.trend_threshold < 0.0 || signal.high_volatility < 0.0 {
            return Err(invalid("signal thresholds must be non-negative"));
        }

        let schedule = &self.schedule;
        if schedule.price_secs == 0 || schedule.signal_secs == 0 || schedule.indicator_secs == 0 {
            return Err(invalid("schedule intervals must be non-zero"));
        }

        if self.lifecycle.history_limit == 0 {
            return Err(invalid("lifecycle.history_limit must be non-zero"));
        }
        if self.market.symbol.trim().is_empty() {
            return Err(invalid("market.symbol must not be empty"));
        }
        if self.market.candle_limit < MIN_CANDLES {
            return Err(EngineError::Config(format!(
                "market.candle_limit must be at least {}",
                MIN_CANDLES
            )));
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> EngineError {
    EngineError::Config(msg.to_string())
}
