//! Signal Analyzer - turns an indicator snapshot into BUY / SELL / HOLD
//!
//! A snapshot built from too few candles always holds. Otherwise rules are
//! evaluated in order and the first match wins:
//! 1. RSI below oversold: BUY unless the trend is bearish
//! 2. RSI above overbought: SELL unless the trend is bullish
//! 3. RSI inside the neutral band: HOLD
//! 4. Range extremes: BUY near support, SELL near resistance
//!
//! High volatility then scales confidence down, and the result is clamped
//! to [`MIN_CONFIDENCE`, `MAX_CONFIDENCE`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SignalConfig;
use crate::indicators::{IndicatorSnapshot, Trend, MIN_CANDLES};
use crate::trade::TradeSide;

pub const MIN_CONFIDENCE: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// RSI points per unit of extra confidence past a threshold
const RSI_CONFIDENCE_SCALE: f64 = 50.0;
/// Position (percent of range) below which an oversold BUY earns the bonus
const BUY_BONUS_POSITION: f64 = 40.0;
const SELL_BONUS_POSITION: f64 = 60.0;
/// Range-extreme entries for rule 4
const RANGE_LOW: f64 = 30.0;
const RANGE_HIGH: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    /// Trade direction, `None` for HOLD
    pub fn side(&self) -> Option<TradeSide> {
        match self {
            SignalAction::Buy => Some(TradeSide::Buy),
            SignalAction::Sell => Some(TradeSide::Sell),
            SignalAction::Hold => None,
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Analyzer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// Always within [0.3, 0.95]
    pub confidence: f64,
    /// Which rule fired and the values that triggered it
    pub rationale: String,
    /// Indicators the decision was made from
    pub indicators: IndicatorSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::Hold
    }

    pub fn price(&self) -> f64 {
        self.indicators.current_price
    }
}

/// Stateless decision rule over an indicator snapshot
#[derive(Debug, Clone, Copy)]
pub struct SignalAnalyzer {
    config: SignalConfig,
}

impl SignalAnalyzer {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, snapshot: &IndicatorSnapshot, now: DateTime<Utc>) -> Signal {
        let cfg = &self.config;

        if !snapshot.sufficient_data {
            return Signal {
                action: SignalAction::Hold,
                confidence: cfg.hold_confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
                rationale: format!(
                    "Insufficient data: {} candles, need {}",
                    snapshot.candle_count, MIN_CANDLES
                ),
                indicators: snapshot.clone(),
                generated_at: now,
            };
        }

        let rsi = snapshot.rsi;
        let trend = snapshot.trend;
        let position = snapshot.price_position;

        let (action, mut confidence, mut rationale) = if rsi < cfg.rsi_oversold {
            if trend != Trend::Bearish {
                let mut conf =
                    cfg.extreme_base_confidence + (cfg.rsi_oversold - rsi) / RSI_CONFIDENCE_SCALE;
                let mut why = format!(
                    "RSI oversold at {:.1} (below {:.0}) with {} trend",
                    rsi, cfg.rsi_oversold, trend
                );
                if position < BUY_BONUS_POSITION {
                    conf += cfg.position_bonus;
                    why.push_str(&format!("; price near support ({:.0}% of range)", position));
                }
                (SignalAction::Buy, conf, why)
            } else {
                (
                    SignalAction::Hold,
                    cfg.hold_confidence,
                    format!(
                        "RSI oversold at {:.1} but trend is bearish; wait for confirmation",
                        rsi
                    ),
                )
            }
        } else if rsi > cfg.rsi_overbought {
            if trend != Trend::Bullish {
                let mut conf =
                    cfg.extreme_base_confidence + (rsi - cfg.rsi_overbought) / RSI_CONFIDENCE_SCALE;
                let mut why = format!(
                    "RSI overbought at {:.1} (above {:.0}) with {} trend",
                    rsi, cfg.rsi_overbought, trend
                );
                if position > SELL_BONUS_POSITION {
                    conf += cfg.position_bonus;
                    why.push_str(&format!(
                        "; price near resistance ({:.0}% of range)",
                        position
                    ));
                }
                (SignalAction::Sell, conf, why)
            } else {
                (
                    SignalAction::Hold,
                    cfg.hold_confidence,
                    format!(
                        "RSI overbought at {:.1} but trend is bullish; wait for confirmation",
                        rsi
                    ),
                )
            }
        } else if rsi >= cfg.neutral_low && rsi <= cfg.neutral_high {
            (
                SignalAction::Hold,
                cfg.neutral_confidence,
                format!(
                    "RSI neutral at {:.1} ({:.0}-{:.0}); no edge",
                    rsi, cfg.neutral_low, cfg.neutral_high
                ),
            )
        } else if position < RANGE_LOW && trend != Trend::Bearish {
            (
                SignalAction::Buy,
                cfg.range_confidence,
                format!(
                    "Price near support at {:.0}% of range with {} trend (RSI {:.1})",
                    position, trend, rsi
                ),
            )
        } else if position > RANGE_HIGH && trend != Trend::Bullish {
            (
                SignalAction::Sell,
                cfg.range_confidence,
                format!(
                    "Price near resistance at {:.0}% of range with {} trend (RSI {:.1})",
                    position, trend, rsi
                ),
            )
        } else {
            (
                SignalAction::Hold,
                cfg.hold_confidence,
                format!(
                    "No clear signal: RSI {:.1}, {} trend, price at {:.0}% of range",
                    rsi, trend, position
                ),
            )
        };

        if snapshot.volatility > cfg.high_volatility {
            confidence *= cfg.volatility_penalty;
            rationale.push_str(&format!(
                "; high volatility ({:.1}%) lowers confidence",
                snapshot.volatility
            ));
        }

        let confidence = confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
        debug!(%action, confidence, "Signal analyzed: {}", rationale);

        Signal {
            action,
            confidence,
            rationale,
            indicators: snapshot.clone(),
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rsi: f64, trend: Trend, position: f64, volatility: f64) -> IndicatorSnapshot {
        let mut snap = IndicatorSnapshot::neutral(100.0, 50);
        snap.rsi = rsi;
        snap.trend = trend;
        snap.price_position = position;
        snap.volatility = volatility;
        snap.support = 90.0;
        snap.resistance = 110.0;
        snap.sufficient_data = true;
        snap
    }

    fn analyze(snap: &IndicatorSnapshot) -> Signal {
        SignalAnalyzer::new(SignalConfig::default()).analyze(snap, Utc::now())
    }

    #[test]
    fn test_oversold_buy_with_position_bonus() {
        let signal = analyze(&snapshot(25.0, Trend::Neutral, 35.0, 1.0));
        assert_eq!(signal.action, SignalAction::Buy);
        // 0.7 + 5/50 + 0.05
        assert!((signal.confidence - 0.85).abs() < 1e-9);
        assert!(signal.rationale.contains("oversold"));
        assert!(signal.rationale.contains("25.0"));
        assert!(signal.rationale.contains("support"));
    }

    #[test]
    fn test_oversold_buy_without_position_bonus() {
        let signal = analyze(&snapshot(25.0, Trend::Neutral, 50.0, 1.0));
        assert_eq!(signal.action, SignalAction::Buy);
        // 0.7 + 5/50
        assert!((signal.confidence - 0.80).abs() < 1e-9);
        assert!(!signal.rationale.contains("support"));
    }

    #[test]
    fn test_oversold_in_bearish_trend_holds() {
        let signal = analyze(&snapshot(20.0, Trend::Bearish, 10.0, 1.0));
        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 0.5);
        assert!(signal.rationale.contains("confirmation"));
        assert!(!signal.is_actionable());
    }

    #[test]
    fn test_overbought_sell_clamps_confidence() {
        // 0.7 + 25/50 + 0.05 = 1.25 -> 0.95
        let signal = analyze(&snapshot(95.0, Trend::Bearish, 90.0, 1.0));
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.confidence, MAX_CONFIDENCE);
        assert!(signal.rationale.contains("overbought"));
        assert!(signal.rationale.contains("95.0"));
    }

    #[test]
    fn test_overbought_sell_confidence() {
        // 0.7 + 5/50 + 0.05
        let near_top = analyze(&snapshot(75.0, Trend::Bearish, 65.0, 1.0));
        assert_eq!(near_top.action, SignalAction::Sell);
        assert!((near_top.confidence - 0.85).abs() < 1e-9);
        assert!(near_top.rationale.contains("resistance"));

        // Mid-range: no bonus
        let mid = analyze(&snapshot(75.0, Trend::Bearish, 50.0, 1.0));
        assert_eq!(mid.action, SignalAction::Sell);
        assert!((mid.confidence - 0.80).abs() < 1e-9);
        assert!(!mid.rationale.contains("resistance"));
    }

    #[test]
    fn test_insufficient_data_always_holds() {
        // Thresholds under which a neutral RSI of 50 would read as oversold
        let mut cfg = SignalConfig::default();
        cfg.rsi_oversold = 55.0;
        cfg.rsi_overbought = 80.0;
        cfg.neutral_low = 60.0;
        cfg.neutral_high = 70.0;

        let snap = IndicatorSnapshot::neutral(100.0, 5);
        let signal = SignalAnalyzer::new(cfg).analyze(&snap, Utc::now());
        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 0.5);
        assert!(signal.rationale.contains("Insufficient data"));
        assert!(signal.rationale.contains("5 candles"));
    }

    #[test]
    fn test_overbought_in_bullish_trend_holds() {
        let signal = analyze(&snapshot(75.0, Trend::Bullish, 90.0, 1.0));
        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.rationale.contains("bullish"));
    }

    #[test]
    fn test_threshold_boundaries_are_strict() {
        // RSI exactly 30 is not oversold; falls to rule 4
        let signal = analyze(&snapshot(30.0, Trend::Neutral, 50.0, 1.0));
        assert_eq!(signal.action, SignalAction::Hold);
        assert!(signal.rationale.contains("No clear signal"));

        let signal = analyze(&snapshot(70.0, Trend::Neutral, 50.0, 1.0));
        assert_eq!(signal.action, SignalAction::Hold);
    }

    #[test]
    fn test_neutral_band_holds_even_at_range_extreme() {
        for rsi in [45.0, 50.0, 55.0] {
            let signal = analyze(&snapshot(rsi, Trend::Bullish, 5.0, 1.0));
            assert_eq!(signal.action, SignalAction::Hold);
            assert_eq!(signal.confidence, 0.6);
            assert!(signal.rationale.contains("neutral"));
        }
    }

    #[test]
    fn test_range_extremes() {
        let buy = analyze(&snapshot(40.0, Trend::Bullish, 20.0, 1.0));
        assert_eq!(buy.action, SignalAction::Buy);
        assert_eq!(buy.confidence, 0.65);
        assert!(buy.rationale.contains("support"));

        let blocked = analyze(&snapshot(40.0, Trend::Bearish, 20.0, 1.0));
        assert_eq!(blocked.action, SignalAction::Hold);

        let sell = analyze(&snapshot(60.0, Trend::Neutral, 80.0, 1.0));
        assert_eq!(sell.action, SignalAction::Sell);
        assert!(sell.rationale.contains("resistance"));
    }

    #[test]
    fn test_high_volatility_penalty() {
        let calm = analyze(&snapshot(40.0, Trend::Bullish, 20.0, 1.0));
        let wild = analyze(&snapshot(40.0, Trend::Bullish, 20.0, 50.0));

        assert_eq!(wild.action, SignalAction::Buy);
        assert!((wild.confidence - calm.confidence * 0.8).abs() < 1e-9);
        assert!(wild.rationale.contains("volatility"));
        assert!(wild.rationale.contains("50.0"));
    }

    #[test]
    fn test_confidence_floor() {
        let mut cfg = SignalConfig::default();
        cfg.hold_confidence = 0.1;
        let signal =
            SignalAnalyzer::new(cfg).analyze(&snapshot(40.0, Trend::Neutral, 50.0, 1.0), Utc::now());
        assert_eq!(signal.confidence, MIN_CONFIDENCE);
    }

    #[test]
    fn test_action_side_mapping() {
        assert_eq!(SignalAction::Buy.side(), Some(TradeSide::Buy));
        assert_eq!(SignalAction::Sell.side(), Some(TradeSide::Sell));
        assert_eq!(SignalAction::Hold.side(), None);
        assert_eq!(serde_json::to_string(&SignalAction::Hold).unwrap(), "\"HOLD\"");
    }
}
