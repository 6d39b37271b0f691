//! Cross-module tests: candles through to a resolved trade

use chrono::{Duration, TimeZone, Utc};

use crate::config::RunnerConfig;
use crate::indicators::tests::flat_candles;
use crate::indicators::{IndicatorEngine, Trend};
use crate::lifecycle::TradeLifecycleManager;
use crate::signal::{SignalAction, SignalAnalyzer, MAX_CONFIDENCE};
use crate::sizing::TradeParameterCalculator;
use crate::trade::{TradeResult, TradeStatus};

/// 20 falling closes then a flat base: RSI 0, neutral trend, price at support
fn capitulation_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
    closes.extend(std::iter::repeat(181.0).take(10));
    closes
}

#[test]
fn test_candles_to_buy_signal() {
    let cfg = RunnerConfig::default();
    let engine = IndicatorEngine::from_config(&cfg.signal);
    let snapshot = engine.compute(&flat_candles(&capitulation_closes()), None);

    assert!(snapshot.sufficient_data);
    assert!(snapshot.rsi.abs() < 1e-9);
    assert_eq!(snapshot.trend, Trend::Neutral);
    assert_eq!(snapshot.price_position, 0.0);
    assert!(snapshot.volatility < cfg.signal.high_volatility);

    let signal = SignalAnalyzer::new(cfg.signal).analyze(&snapshot, Utc::now());
    assert_eq!(signal.action, SignalAction::Buy);
    assert_eq!(signal.confidence, MAX_CONFIDENCE);
    assert!(signal.rationale.contains("oversold"));
    assert_eq!(signal.price(), 181.0);
}

#[test]
fn test_signal_to_resolved_trade() {
    let cfg = RunnerConfig::default();
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let snapshot = IndicatorEngine::from_config(&cfg.signal)
        .compute(&flat_candles(&capitulation_closes()), None);
    let signal = SignalAnalyzer::new(cfg.signal).analyze(&snapshot, t0);
    let side = signal.action.side().unwrap();
    let params = TradeParameterCalculator::new(cfg.risk)
        .calculate(side, signal.price())
        .unwrap();

    let mut lifecycle = TradeLifecycleManager::new(&cfg.market.symbol, &cfg.lifecycle);
    let opened = lifecycle.open_trade(&signal, &params, t0).unwrap().clone();
    assert_eq!(opened.rationale, signal.rationale);
    assert_eq!(opened.confidence, signal.confidence);

    // Between sl and tp1
    assert!(lifecycle.evaluate(181.5, t0 + Duration::seconds(10)).unwrap().is_none());

    let done = t0 + Duration::minutes(5);
    let resolved = lifecycle.evaluate(params.tp1, done).unwrap().unwrap();
    assert_eq!(resolved.status(), TradeStatus::HitTp1);
    assert_eq!(resolved.result(), Some(TradeResult::Win));

    // 2_500 notional, 1.5% move
    assert!((resolved.pnl().unwrap() - 37.5).abs() < 1e-6);
    assert!((lifecycle.statistics().total_pnl - 37.5).abs() < 1e-6);
    assert!(lifecycle.is_in_cooldown(done + Duration::seconds(179)));
    assert!(!lifecycle.is_in_cooldown(done + Duration::seconds(181)));
}
