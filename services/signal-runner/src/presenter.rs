//! Presentation - read-only dashboard projections

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::indicators::IndicatorSnapshot;
use crate::signal::Signal;
use crate::stats::Statistics;
use crate::trade::Trade;

/// Trades included in [`DashboardView::recent_trades`]
pub const RECENT_TRADES: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ActiveTradeView {
    pub trade: Trade,
    /// At the current price
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsView {
    #[serde(flatten)]
    pub totals: Statistics,
    pub losing_trades: u32,
    pub win_rate: f64,
}

impl From<&Statistics> for StatisticsView {
    fn from(stats: &Statistics) -> Self {
        Self {
            totals: *stats,
            losing_trades: stats.losing_trades(),
            win_rate: stats.win_rate(),
        }
    }
}

/// Snapshot of everything a dashboard shows
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub symbol: String,
    pub price: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub indicators: Option<IndicatorSnapshot>,
    pub last_signal: Option<Signal>,
    pub active_trade: Option<ActiveTradeView>,
    pub statistics: StatisticsView,
    /// Seconds left, `None` when not cooling down
    pub cooldown_remaining_secs: Option<i64>,
    /// Newest first
    pub recent_trades: Vec<Trade>,
    pub generated_at: DateTime<Utc>,
}

/// Receives projections after state changes. Return values are never consumed.
pub trait Presenter: Send + Sync {
    fn render(&self, view: &DashboardView);
}

/// Renders the dashboard as tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn render(&self, view: &DashboardView) {
        let stats = &view.statistics;
        info!(
            symbol = %view.symbol,
            price = view.price.unwrap_or_default(),
            trades = stats.totals.total_trades,
            win_rate = %format!("{:.1}%", stats.win_rate),
            total_pnl = %format!("{:+.2}", stats.totals.total_pnl),
            streak = stats.totals.current_streak,
            "Dashboard"
        );

        if let Some(ind) = &view.indicators {
            info!(
                rsi = %format!("{:.1}", ind.rsi),
                trend = %ind.trend,
                volatility = %format!("{:.2}%", ind.volatility),
                support = ind.support,
                resistance = ind.resistance,
                position = %format!("{:.0}%", ind.price_position),
                "Indicators"
            );
        }

        if let Some(active) = &view.active_trade {
            let t = &active.trade;
            info!(
                side = %t.side,
                entry = t.entry_price,
                tp1 = t.tp1,
                tp2 = t.tp2,
                sl = t.sl,
                unrealized_pnl = %format!("{:+.2}", active.unrealized_pnl),
                "Active trade"
            );
        } else if let Some(signal) = &view.last_signal {
            info!(
                action = %signal.action,
                confidence = %format!("{:.0}%", signal.confidence * 100.0),
                "Last signal: {}",
                signal.rationale
            );
        }

        if let Some(secs) = view.cooldown_remaining_secs {
            info!("Cooldown: {}m {:02}s remaining", secs / 60, secs % 60);
        }
    }
}
