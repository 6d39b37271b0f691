//! Trading Orchestrator - tick handlers and the main loop
//!
//! One task owns the orchestrator, so price, signal and indicator ticks
//! never mutate state concurrently. Failed fetches cost only the tick they
//! happened in; the next scheduled tick retries.

use chrono::{DateTime, Utc};
use market_data::{MarketDataError, MarketDataSource, Ticker};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::{EngineError, Result};
use crate::indicators::{IndicatorEngine, IndicatorSnapshot};
use crate::lifecycle::TradeLifecycleManager;
use crate::presenter::{ActiveTradeView, DashboardView, Presenter, RECENT_TRADES};
use crate::signal::{Signal, SignalAnalyzer};
use crate::sizing::TradeParameterCalculator;
use crate::state::{PersistedState, StateStore};
use crate::trade::Trade;

/// Result of a price-refresh tick
#[derive(Debug, Clone, PartialEq)]
pub enum PriceTick {
    /// Fetch failed; nothing changed
    Skipped,
    Updated { price: f64 },
    /// The new price hit a level of the active trade
    Resolved(Trade),
}

/// Result of a signal-check tick
#[derive(Debug, Clone, PartialEq)]
pub enum SignalTick {
    TradeActive,
    CoolingDown { remaining_secs: i64 },
    Skipped,
    Hold(Signal),
    Opened(Trade),
}

/// Result of an indicator-refresh tick
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorTick {
    Skipped,
    Refreshed(IndicatorSnapshot),
}

/// Latest ticker values, as floats
#[derive(Debug, Clone, Copy, Default)]
struct MarketState {
    price: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
}

impl MarketState {
    /// Take the ticker if its price is finite and positive; otherwise keep
    /// the previous values
    fn apply(&mut self, ticker: &Ticker) -> Option<f64> {
        let price = ticker
            .last_price
            .to_f64()
            .filter(|p| p.is_finite() && *p > 0.0)?;
        self.price = Some(price);
        self.high_24h = ticker.high_24h.to_f64();
        self.low_24h = ticker.low_24h.to_f64();
        Some(price)
    }
}

fn unusable_price(ticker: &Ticker) -> EngineError {
    MarketDataError::Format(format!(
        "Unusable price {} for {}",
        ticker.last_price, ticker.symbol
    ))
    .into()
}

/// Owns every piece of mutable engine state
pub struct TradingOrchestrator {
    config: RunnerConfig,
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn StateStore>,
    presenter: Arc<dyn Presenter>,
    engine: IndicatorEngine,
    analyzer: SignalAnalyzer,
    calculator: TradeParameterCalculator,
    lifecycle: TradeLifecycleManager,
    market: MarketState,
    indicators: Option<IndicatorSnapshot>,
    last_signal: Option<Signal>,
}

impl TradingOrchestrator {
    pub fn new(
        config: RunnerConfig,
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn StateStore>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            engine: IndicatorEngine::from_config(&config.signal),
            analyzer: SignalAnalyzer::new(config.signal),
            calculator: TradeParameterCalculator::new(config.risk),
            lifecycle: TradeLifecycleManager::new(&config.market.symbol, &config.lifecycle),
            config,
            source,
            store,
            presenter,
            market: MarketState::default(),
            indicators: None,
            last_signal: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &TradeLifecycleManager {
        &self.lifecycle
    }

    pub fn indicators(&self) -> Option<&IndicatorSnapshot> {
        self.indicators.as_ref()
    }

    pub fn last_signal(&self) -> Option<&Signal> {
        self.last_signal.as_ref()
    }

    pub fn current_price(&self) -> Option<f64> {
        self.market.price
    }

    /// Load persisted state. Returns whether anything was restored.
    pub async fn restore(&mut self) -> bool {
        match self.store.load().await {
            Ok(Some(state)) => {
                info!(
                    "Restored {} trades, active: {}",
                    state.trade_history.len(),
                    state.active_trade.is_some()
                );
                self.lifecycle.restore(
                    state.active_trade,
                    state.trade_history,
                    state.statistics,
                    state.cooldown_end,
                );
                self.last_signal = state.last_signal;
                true
            }
            Ok(None) => {
                debug!("No persisted state");
                false
            }
            Err(e) => {
                warn!("Failed to load state, starting fresh: {}", e);
                false
            }
        }
    }

    /// Fetch indicators and price once before the loop starts
    pub async fn prime(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.on_indicator_tick(now).await?;
        self.on_price_tick(now).await?;
        Ok(())
    }

    /// Refresh the price and check the active trade against its levels
    pub async fn on_price_tick(&mut self, now: DateTime<Utc>) -> Result<PriceTick> {
        let ticker = match self.source.get_ticker(&self.config.market.symbol).await {
            Ok(ticker) => ticker,
            Err(e) => {
                warn!("Price tick skipped: {}", e);
                return Ok(PriceTick::Skipped);
            }
        };

        let price = match self.market.apply(&ticker) {
            Some(price) => price,
            None => {
                warn!("Price tick skipped: {}", unusable_price(&ticker));
                return Ok(PriceTick::Skipped);
            }
        };
        self.indicators = self.indicators.as_ref().map(|ind| ind.with_price(price));

        let outcome = match self.lifecycle.evaluate(price, now)? {
            Some(trade) => {
                self.persist(now).await;
                PriceTick::Resolved(trade)
            }
            None => {
                debug!("Price {} {:.4}", self.config.market.symbol, price);
                PriceTick::Updated { price }
            }
        };

        self.render(now);
        Ok(outcome)
    }

    /// Look for a new trade unless one is open or the cooldown is running
    pub async fn on_signal_tick(&mut self, now: DateTime<Utc>) -> Result<SignalTick> {
        if self.lifecycle.active_trade().is_some() {
            debug!("Signal tick: trade active");
            return Ok(SignalTick::TradeActive);
        }
        if let Some(remaining) = self.lifecycle.cooldown().remaining(now) {
            debug!("Signal tick: cooling down for {}s", remaining.num_seconds());
            return Ok(SignalTick::CoolingDown {
                remaining_secs: remaining.num_seconds(),
            });
        }

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_data_unavailable() => {
                warn!("Signal tick skipped: {}", e);
                return Ok(SignalTick::Skipped);
            }
            Err(e) => return Err(e),
        };
        self.indicators = Some(snapshot.clone());

        let signal = self.analyzer.analyze(&snapshot, now);
        self.last_signal = Some(signal.clone());

        let side = match signal.action.side() {
            Some(side) => side,
            None => {
                info!("HOLD ({:.0}%): {}", signal.confidence * 100.0, signal.rationale);
                self.render(now);
                return Ok(SignalTick::Hold(signal));
            }
        };

        info!(
            "{} signal ({:.0}%): {}",
            signal.action,
            signal.confidence * 100.0,
            signal.rationale
        );

        let params = self.calculator.calculate(side, signal.price())?;
        let trade = self.lifecycle.open_trade(&signal, &params, now)?.clone();

        self.persist(now).await;
        self.render(now);
        Ok(SignalTick::Opened(trade))
    }

    /// Recompute the indicator snapshot from fresh candles
    pub async fn on_indicator_tick(&mut self, now: DateTime<Utc>) -> Result<IndicatorTick> {
        let candles = match self.fetch_candles().await {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Indicator tick skipped: {}", e);
                return Ok(IndicatorTick::Skipped);
            }
        };

        let snapshot = self.engine.compute(&candles, self.market.price);
        if !snapshot.sufficient_data {
            warn!(
                "Only {} candles for {}, indicators are neutral",
                candles.len(),
                self.config.market.symbol
            );
        }
        self.indicators = Some(snapshot.clone());

        self.render(now);
        Ok(IndicatorTick::Refreshed(snapshot))
    }

    /// Manual override of the post-resolution cooldown
    pub async fn skip_cooldown(&mut self, now: DateTime<Utc>) {
        if self.lifecycle.is_in_cooldown(now) {
            info!("Cooldown skipped");
        }
        self.lifecycle.clear_cooldown();
        self.persist(now).await;
        self.render(now);
    }

    /// Clear trades, statistics, cooldown and the last signal, then persist.
    ///
    /// Only reachable on an orchestrator that is not running: a spawned
    /// one is owned by its task until [`RunnerHandle::stop`] hands it back.
    pub async fn reset(&mut self, now: DateTime<Utc>) {
        info!("Resetting trading state");
        self.lifecycle.reset();
        self.last_signal = None;
        self.persist(now).await;
        self.render(now);
    }

    /// Best-effort save of the current state
    pub async fn persist(&self, now: DateTime<Utc>) {
        if let Err(e) = self.store.save(&self.snapshot(now)).await {
            warn!("Failed to persist state: {}", e);
        }
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> PersistedState {
        PersistedState {
            trade_history: self.lifecycle.history().iter().cloned().collect(),
            statistics: *self.lifecycle.statistics(),
            cooldown_end: self.lifecycle.cooldown().end,
            active_trade: self.lifecycle.active_trade().cloned(),
            last_signal: self.last_signal.clone(),
            saved_at: Some(now),
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> DashboardView {
        let price = self.market.price;
        let active_trade = self.lifecycle.active_trade().map(|trade| ActiveTradeView {
            unrealized_pnl: price
                .and_then(|p| trade.unrealized_pnl(p))
                .unwrap_or_default(),
            trade: trade.clone(),
        });

        DashboardView {
            symbol: self.config.market.symbol.clone(),
            price,
            high_24h: self.market.high_24h,
            low_24h: self.market.low_24h,
            indicators: self.indicators.clone(),
            last_signal: self.last_signal.clone(),
            active_trade,
            statistics: self.lifecycle.statistics().into(),
            cooldown_remaining_secs: self
                .lifecycle
                .cooldown()
                .remaining(now)
                .map(|d| d.num_seconds()),
            recent_trades: self
                .lifecycle
                .history()
                .iter()
                .take(RECENT_TRADES)
                .cloned()
                .collect(),
            generated_at: now,
        }
    }

    fn render(&self, now: DateTime<Utc>) {
        self.presenter.render(&self.view(now));
    }

    async fn fetch_candles(&self) -> Result<Vec<market_data::Candle>> {
        let market = &self.config.market;
        let candles = self
            .source
            .get_candles(&market.symbol, market.timeframe, market.candle_limit)
            .await?;
        Ok(candles)
    }

    /// Fresh ticker and candles, combined into one snapshot
    async fn fetch_snapshot(&mut self) -> Result<IndicatorSnapshot> {
        let ticker = self.source.get_ticker(&self.config.market.symbol).await?;
        let price = self
            .market
            .apply(&ticker)
            .ok_or_else(|| unusable_price(&ticker))?;
        let candles = self.fetch_candles().await?;
        Ok(self.engine.compute(&candles, Some(price)))
    }

    /// Run the tick loop on its own task
    pub fn spawn(self) -> RunnerHandle {
        let (control_tx, control_rx) = mpsc::channel(8);
        let task = tokio::spawn(self.run(control_rx));
        RunnerHandle {
            control: control_tx,
            task,
        }
    }

    async fn run(mut self, mut control: mpsc::Receiver<Control>) -> Self {
        let schedule = self.config.schedule;
        let mut price_interval = schedule_interval(schedule.price_interval());
        let mut signal_interval = schedule_interval(schedule.signal_interval());
        let mut indicator_interval = schedule_interval(schedule.indicator_interval());

        info!(
            "Runner started for {} (price {}s, signal {}s, indicators {}s)",
            self.config.market.symbol, schedule.price_secs, schedule.signal_secs, schedule.indicator_secs
        );

        loop {
            tokio::select! {
                biased;

                cmd = control.recv() => {
                    match cmd {
                        Some(Control::SkipCooldown) => self.skip_cooldown(Utc::now()).await,
                        Some(Control::Stop) | None => break,
                    }
                }
                _ = indicator_interval.tick() => {
                    if let Err(e) = self.on_indicator_tick(Utc::now()).await {
                        error!("Indicator tick error: {}", e);
                    }
                }
                _ = price_interval.tick() => {
                    if let Err(e) = self.on_price_tick(Utc::now()).await {
                        error!("Price tick error: {}", e);
                    }
                }
                _ = signal_interval.tick() => {
                    if let Err(e) = self.on_signal_tick(Utc::now()).await {
                        error!("Signal tick error: {}", e);
                    }
                }
            }
        }

        info!("Runner stopped");
        self
    }
}

/// First tick one period from now; late ticks are dropped rather than bursted
fn schedule_interval(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

enum Control {
    SkipCooldown,
    Stop,
}

/// Control surface of a spawned orchestrator
pub struct RunnerHandle {
    control: mpsc::Sender<Control>,
    task: JoinHandle<TradingOrchestrator>,
}

impl RunnerHandle {
    /// Clear the cooldown window from outside the loop
    pub async fn skip_cooldown(&self) -> Result<()> {
        self.control
            .send(Control::SkipCooldown)
            .await
            .map_err(|_| EngineError::InvalidState("Runner is not running".to_string()))
    }

    /// Stop all three triggers and take the orchestrator back
    pub async fn stop(self) -> Result<TradingOrchestrator> {
        // A closed channel means the loop already exited; the join still returns it
        let _ = self.control.send(Control::Stop).await;
        self.task
            .await
            .map_err(|e| EngineError::InvalidState(format!("Runner task failed: {}", e)))
    }
}
