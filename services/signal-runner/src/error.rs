//! Engine error taxonomy

use market_data::MarketDataError;

/// Errors surfaced by the signal engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Contract violation: opening while a trade is active, resolving while
    /// idle, or opening from a HOLD signal
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Not enough candles for the strict indicator path
    #[error("Insufficient data: need {required} candles, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Market data failures only cost the current tick
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, EngineError::MarketData(_))
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
