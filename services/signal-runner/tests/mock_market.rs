//! Scripted collaborators for driving the orchestrator without a network

use chrono::{Duration, TimeZone, Utc};
use market_data::{
    Candle, MarketDataError, MarketDataSource, Result, SourceHealth, Ticker, TimeFrame,
};
use rust_decimal::Decimal;
use signal_runner::{DashboardView, EngineError, PersistedState, Presenter, StateStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn dec(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap()
}

/// One candle per close, with high = low = close
pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + Duration::hours(i as i64),
            open: dec(close),
            high: dec(close),
            low: dec(close),
            close: dec(close),
            volume: Decimal::ONE,
        })
        .collect()
}

/// Sell-off into a flat base at 181: oversold, neutral trend, at support
pub fn capitulation_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
    closes.extend(std::iter::repeat(181.0).take(10));
    closes
}

/// Market data source with a settable price and candle set
pub struct MockMarket {
    price: Mutex<f64>,
    candles: Mutex<Vec<Candle>>,
    failing: Mutex<bool>,
    pub ticker_calls: AtomicUsize,
    pub candle_calls: AtomicUsize,
}

impl MockMarket {
    pub fn new(price: f64, candles: Vec<Candle>) -> Self {
        Self {
            price: Mutex::new(price),
            candles: Mutex::new(candles),
            failing: Mutex::new(false),
            ticker_calls: AtomicUsize::new(0),
            candle_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    /// While set, every request fails with a network error
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn ticker_calls(&self) -> usize {
        self.ticker_calls.load(Ordering::SeqCst)
    }

    pub fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(MarketDataError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MarketDataSource for MockMarket {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let price = *self.price.lock().unwrap();
        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price: dec(price),
            high_24h: dec(price * 1.02),
            low_24h: dec(price * 0.98),
            timestamp: Utc::now(),
        })
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        _timeframe: TimeFrame,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let candles = self.candles.lock().unwrap();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn health(&self) -> SourceHealth {
        SourceHealth {
            source: "mock".to_string(),
            is_healthy: !*self.failing.lock().unwrap(),
            last_success: None,
            last_error: None,
            success_rate: 1.0,
            avg_latency_ms: 0,
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// In-memory state store
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<Option<PersistedState>>,
    pub saves: AtomicUsize,
    pub fail_saves: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Option<PersistedState> {
        self.state.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> signal_runner::Result<Option<PersistedState>> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, state: &PersistedState) -> signal_runner::Result<()> {
        if *self.fail_saves.lock().unwrap() {
            return Err(EngineError::Persistence("disk full".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }
}

/// Keeps every rendered view
#[derive(Default)]
pub struct RecordingPresenter {
    pub views: Mutex<Vec<DashboardView>>,
}

impl RecordingPresenter {
    pub fn last(&self) -> Option<DashboardView> {
        self.views.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.views.lock().unwrap().len()
    }
}

impl Presenter for RecordingPresenter {
    fn render(&self, view: &DashboardView) {
        self.views.lock().unwrap().push(view.clone());
    }
}
