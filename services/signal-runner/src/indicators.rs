//! Indicator Engine - RSI, trend, volatility and support/resistance
//!
//! Everything here is a pure function of a candle slice. A snapshot is
//! recomputed wholesale for every candle batch.

use chrono::{DateTime, Utc};
use market_data::Candle;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::config::SignalConfig;
use crate::error::{EngineError, Result};

/// Candles required for a full snapshot
pub const MIN_CANDLES: usize = 20;
/// Lookback for support/resistance
pub const RANGE_WINDOW: usize = 20;
const SHORT_SMA: usize = 5;
const LONG_SMA: usize = 10;
/// Minimum closes for trend and volatility
const MIN_SERIES: usize = 10;
const TRADING_DAYS: f64 = 252.0;
const NEUTRAL_RSI: f64 = 50.0;
const NEUTRAL_POSITION: f64 = 50.0;

/// Trend classification from short vs long moving average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Bullish => write!(f, "bullish"),
            Trend::Bearish => write!(f, "bearish"),
            Trend::Neutral => write!(f, "neutral"),
        }
    }
}

/// Indicator state for one candle batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// 0-100
    pub rsi: f64,
    pub trend: Trend,
    /// Short/long SMA divergence in percent
    pub trend_change_pct: f64,
    /// Annualized, in percent
    pub volatility: f64,
    pub support: f64,
    pub resistance: f64,
    /// Price placement within [support, resistance], 0-100
    pub price_position: f64,
    pub current_price: f64,
    /// False when the snapshot is the neutral fallback
    pub sufficient_data: bool,
    pub candle_count: usize,
    pub computed_at: DateTime<Utc>,
}

impl IndicatorSnapshot {
    /// Neutral snapshot used when there are too few candles
    pub fn neutral(current_price: f64, candle_count: usize) -> Self {
        Self {
            rsi: NEUTRAL_RSI,
            trend: Trend::Neutral,
            trend_change_pct: 0.0,
            volatility: 0.0,
            support: current_price,
            resistance: current_price,
            price_position: NEUTRAL_POSITION,
            current_price,
            sufficient_data: false,
            candle_count,
            computed_at: Utc::now(),
        }
    }

    /// Re-place a new live price inside the existing range
    pub fn with_price(&self, current_price: f64) -> Self {
        Self {
            current_price,
            price_position: price_position(current_price, self.support, self.resistance),
            ..self.clone()
        }
    }
}

/// Computes indicator snapshots with the configured RSI period and trend threshold
#[derive(Debug, Clone, Copy)]
pub struct IndicatorEngine {
    rsi_period: usize,
    trend_threshold: f64,
}

impl IndicatorEngine {
    pub fn new(rsi_period: usize, trend_threshold: f64) -> Self {
        Self {
            rsi_period,
            trend_threshold,
        }
    }

    pub fn from_config(cfg: &SignalConfig) -> Self {
        Self::new(cfg.rsi_period, cfg.trend_threshold)
    }

    /// Full snapshot, or a neutral one when fewer than [`MIN_CANDLES`] are given.
    ///
    /// `current_price` defaults to the last close.
    pub fn compute(&self, candles: &[Candle], current_price: Option<f64>) -> IndicatorSnapshot {
        match self.try_compute(candles, current_price) {
            Ok(snapshot) => snapshot,
            Err(_) => {
                let price = current_price
                    .or_else(|| candles.last().map(|c| to_f64(c.close)))
                    .unwrap_or(0.0);
                IndicatorSnapshot::neutral(price, candles.len())
            }
        }
    }

    /// Strict variant that reports insufficient data instead of degrading
    pub fn try_compute(
        &self,
        candles: &[Candle],
        current_price: Option<f64>,
    ) -> Result<IndicatorSnapshot> {
        if candles.len() < MIN_CANDLES {
            return Err(EngineError::InsufficientData {
                required: MIN_CANDLES,
                available: candles.len(),
            });
        }

        let series = PriceSeries::from_candles(candles);
        let price = current_price.unwrap_or_else(|| series.closes[series.closes.len() - 1]);

        let (support, resistance) = support_resistance(&series.highs, &series.lows, RANGE_WINDOW);
        let (trend, trend_change_pct) = trend(&series.closes, self.trend_threshold);

        Ok(IndicatorSnapshot {
            rsi: rsi(&series.closes, self.rsi_period),
            trend,
            trend_change_pct,
            volatility: volatility(&series.closes),
            support,
            resistance,
            price_position: price_position(price, support, resistance),
            current_price: price,
            sufficient_data: true,
            candle_count: candles.len(),
            computed_at: Utc::now(),
        })
    }
}

/// Column view of a candle slice as floats
struct PriceSeries {
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
}

impl PriceSeries {
    fn from_candles(candles: &[Candle]) -> Self {
        Self {
            closes: candles.iter().map(|c| to_f64(c.close)).collect(),
            highs: candles.iter().map(|c| to_f64(c.high)).collect(),
            lows: candles.iter().map(|c| to_f64(c.low)).collect(),
        }
    }
}

fn to_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Wilder RSI.
///
/// The first `period - 1` deltas (indices 1..period) seed simple averages;
/// each later delta updates them as `(avg * (period - 1) + current) / period`.
/// Returns 50 with fewer than `period` closes and 100 when the average loss
/// is exactly zero.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period < 2 || closes.len() < period {
        return NEUTRAL_RSI;
    }

    let seed = (period - 1) as f64;
    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in 1..period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gain_sum += change;
        } else {
            loss_sum -= change;
        }
    }

    let mut avg_gain = gain_sum / seed;
    let mut avg_loss = loss_sum / seed;

    for i in period..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * seed + gain) / period as f64;
        avg_loss = (avg_loss * seed + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// (support, resistance) = (min low, max high) over the last `window` bars
pub fn support_resistance(highs: &[f64], lows: &[f64], window: usize) -> (f64, f64) {
    let start_h = highs.len().saturating_sub(window);
    let start_l = lows.len().saturating_sub(window);

    let resistance = highs[start_h..]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let support = lows[start_l..].iter().copied().fold(f64::INFINITY, f64::min);

    if !support.is_finite() || !resistance.is_finite() {
        return (0.0, 0.0);
    }
    (support, resistance)
}

/// Percent placement of `price` in the range, clamped to [0, 100].
/// A collapsed or inverted range yields 50.
pub fn price_position(price: f64, support: f64, resistance: f64) -> f64 {
    if !(resistance > support) {
        return NEUTRAL_POSITION;
    }
    let position = (price - support) / (resistance - support) * 100.0;
    if position.is_nan() {
        return NEUTRAL_POSITION;
    }
    position.clamp(0.0, 100.0)
}

/// SMA(5) vs SMA(10) divergence against `threshold` percent
pub fn trend(closes: &[f64], threshold: f64) -> (Trend, f64) {
    if closes.len() < MIN_SERIES {
        return (Trend::Neutral, 0.0);
    }

    let short = mean(&closes[closes.len() - SHORT_SMA..]);
    let long = mean(&closes[closes.len() - LONG_SMA..]);
    if long == 0.0 {
        return (Trend::Neutral, 0.0);
    }

    let change = (short - long) / long * 100.0;
    let trend = if change > threshold {
        Trend::Bullish
    } else if change < -threshold {
        Trend::Bearish
    } else {
        Trend::Neutral
    };
    (trend, change)
}

/// Population std-dev of close-to-close returns, annualized with sqrt(252), in percent
pub fn volatility(closes: &[f64]) -> f64 {
    if closes.len() < MIN_SERIES {
        return 0.0;
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    if returns.is_empty() {
        return 0.0;
    }

    let avg = mean(&returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64;

    variance.sqrt() * TRADING_DAYS.sqrt() * 100.0
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    /// Candles whose open/high/low/close all equal the given close
    pub(crate) fn flat_candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let px = Decimal::try_from(close).unwrap();
                Candle {
                    timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 3600, 0).unwrap(),
                    open: px,
                    high: px,
                    low: px,
                    close: px,
                    volume: Decimal::ONE,
                }
            })
            .collect()
    }

    #[test]
    fn test_rsi_regression_oracle() {
        let closes = [
            100.0, 101.0, 99.0, 102.0, 98.0, 103.0, 97.0, 104.0, 96.0, 105.0, 95.0, 106.0, 94.0,
            107.0,
        ];
        // gains 49, losses 42 -> RS = 7/6 -> RSI = 700/13
        let value = rsi(&closes, 14);
        assert!((value - 700.0 / 13.0).abs() < 1e-9, "rsi = {}", value);
    }

    #[test]
    fn test_rsi_monotonic_series() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14), 100.0);

        let falling: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        assert!(rsi(&falling, 14).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_short_series_is_neutral() {
        let closes: Vec<f64> = (0..13).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&closes, 14), 50.0);
    }

    #[test]
    fn test_rsi_smoothing_after_seed() {
        // 13 rising deltas seed avg_gain = 1; one drop of 14 follows
        let mut closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        closes.push(closes[13] - 14.0);

        let avg_gain = 13.0 / 14.0;
        let avg_loss = 1.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((rsi(&closes, 14) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_price_position_bounds() {
        assert_eq!(price_position(150.0, 100.0, 120.0), 100.0);
        assert_eq!(price_position(50.0, 100.0, 120.0), 0.0);
        assert_eq!(price_position(110.0, 100.0, 120.0), 50.0);
        assert_eq!(price_position(110.0, 100.0, 100.0), 50.0);
        assert_eq!(price_position(110.0, 120.0, 100.0), 50.0);

        for price in [0.0, 1.0, 99.9, 100.0, 1e9, -5.0] {
            for (s, r) in [(100.0, 100.0), (90.0, 110.0), (110.0, 90.0), (0.0, 0.0)] {
                let p = price_position(price, s, r);
                assert!((0.0..=100.0).contains(&p));
            }
        }
    }

    #[test]
    fn test_support_resistance_uses_recent_window() {
        let mut highs = vec![500.0; 5];
        highs.extend((0..20).map(|i| 100.0 + i as f64));
        let mut lows = vec![1.0; 5];
        lows.extend((0..20).map(|i| 90.0 + i as f64));

        let (support, resistance) = support_resistance(&highs, &lows, 20);
        assert_eq!(support, 90.0);
        assert_eq!(resistance, 119.0);
    }

    #[test]
    fn test_trend_classification() {
        let up: Vec<f64> = (0..10).map(|i| 100.0 + i as f64 * 2.0).collect();
        let (t, change) = trend(&up, 0.5);
        assert_eq!(t, Trend::Bullish);
        assert!(change > 0.5);

        let down: Vec<f64> = (0..10).map(|i| 100.0 - i as f64 * 2.0).collect();
        assert_eq!(trend(&down, 0.5).0, Trend::Bearish);

        let flat = vec![100.0; 10];
        assert_eq!(trend(&flat, 0.5), (Trend::Neutral, 0.0));

        assert_eq!(trend(&up[..9], 0.5).0, Trend::Neutral);
    }

    #[test]
    fn test_volatility() {
        assert_eq!(volatility(&[100.0; 9]), 0.0);
        assert_eq!(volatility(&[100.0; 20]), 0.0);

        // Alternating +1% / -1% style moves give a non-zero figure
        let zigzag: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let vol = volatility(&zigzag);
        assert!(vol > 10.0 && vol < 20.0, "vol = {}", vol);
    }

    #[test]
    fn test_compute_degrades_with_few_candles() {
        let engine = IndicatorEngine::new(14, 0.5);
        let candles = flat_candles(&[100.0; 19]);

        let snapshot = engine.compute(&candles, Some(101.0));
        assert!(!snapshot.sufficient_data);
        assert_eq!(snapshot.rsi, 50.0);
        assert_eq!(snapshot.trend, Trend::Neutral);
        assert_eq!(snapshot.price_position, 50.0);
        assert_eq!(snapshot.current_price, 101.0);

        assert!(matches!(
            engine.try_compute(&candles, None),
            Err(EngineError::InsufficientData { required: 20, available: 19 })
        ));
    }

    #[test]
    fn test_compute_full_snapshot() {
        let engine = IndicatorEngine::new(14, 0.5);
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let candles = flat_candles(&closes);

        let snapshot = engine.compute(&candles, None);
        assert!(snapshot.sufficient_data);
        assert_eq!(snapshot.rsi, 100.0);
        assert_eq!(snapshot.trend, Trend::Bullish);
        assert_eq!(snapshot.support, 110.0);
        assert_eq!(snapshot.resistance, 129.0);
        assert_eq!(snapshot.current_price, 129.0);
        assert_eq!(snapshot.price_position, 100.0);
        assert!(snapshot.volatility > 0.0);

        let moved = snapshot.with_price(119.5);
        assert_eq!(moved.price_position, 50.0);
    }
}
