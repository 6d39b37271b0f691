//! Market data collaborator
//!
//! Ticker and candle retrieval behind the [`MarketDataSource`] trait, with a
//! Binance public REST implementation.

pub mod types;
pub mod sources {
    pub mod binance;
}

pub use sources::binance::{BinanceClient, DEFAULT_BASE_URL};
pub use types::*;
