use futures::future::join_all;
use shared::{Config, Direction, HitRates, ScoringConfig, Signal, SignalError, TradeType};

use super::indicators::{self, IndicatorSet};
use super::market_data::{Candle, MarketDataSource};
use super::scorer;

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub timeframes: Vec<String>,
    pub candle_limit: usize,
    pub min_agreement: usize,
    pub min_quote_volume: f64,
    pub timeframe_volume_ratio: f64,
    pub scoring: ScoringConfig,
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeframes: config.timeframes.clone(),
            candle_limit: config.candle_limit,
            min_agreement: config.min_agreement,
            min_quote_volume: config.min_quote_volume,
            timeframe_volume_ratio: config.timeframe_volume_ratio,
            scoring: config.scoring.clone(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timeframes: ["15m", "1h", "4h", "1d"].iter().map(|s| s.to_string()).collect(),
            candle_limit: 100,
            min_agreement: 2,
            min_quote_volume: 1_000_000.0,
            timeframe_volume_ratio: 1.2,
            scoring: ScoringConfig::default(),
        }
    }
}

/// The candle before last broke further than the last one while the
/// candle before it had not cleared that level: the move already failed.
pub fn is_fake_breakout(candles: &[Candle], direction: Direction) -> bool {
    let [.., before, prev, last] = candles else {
        return false;
    };
    match direction {
        Direction::Long => prev.high > last.high && before.close <= prev.high,
        Direction::Short => prev.low < last.low && before.close >= prev.low,
    }
}

/// Rejects a scored timeframe on thin last-candle volume or a fake breakout.
pub fn confirm_timeframe(
    signal: Signal,
    candles: &[Candle],
    set: &IndicatorSet,
    volume_ratio: f64,
) -> Result<Signal, SignalError> {
    if set.volume < volume_ratio * set.volume_sma_20 {
        return Err(SignalError::ThinVolume {
            volume: set.volume,
            average: set.volume_sma_20,
            ratio: volume_ratio,
        });
    }
    if is_fake_breakout(candles, signal.direction) {
        return Err(SignalError::FakeBreakout {
            direction: signal.direction,
        });
    }
    Ok(signal)
}

/// Fetches, computes, scores and confirms a single timeframe.
pub async fn analyze_timeframe(
    source: &dyn MarketDataSource,
    symbol: &str,
    timeframe: &str,
    settings: &AnalysisSettings,
    history: Option<&HitRates>,
) -> Result<Signal, SignalError> {
    let candles = source
        .fetch_candles(symbol, timeframe, settings.candle_limit)
        .await
        .map_err(|e| SignalError::Exchange(format!("{:#}", e)))?;
    let set = indicators::calculate(&candles)?;
    let signal = scorer::score(symbol, timeframe, &set, &settings.scoring, history)?;
    tracing::debug!(
        "[{}] {} fib 0.382 {:.6}, 0.618 {:.6}",
        symbol,
        timeframe,
        set.fib_382,
        set.fib_618
    );
    confirm_timeframe(signal, &candles, &set, settings.timeframe_volume_ratio)
}

/// Merges per-timeframe signals (in configured timeframe order) into one.
pub fn combine(signals: &[Signal], total: usize, min_agreement: usize) -> Result<Signal, SignalError> {
    let long = signals.iter().filter(|s| s.direction == Direction::Long).count();
    let short = signals.len() - long;
    let count = long.max(short);
    let rejected = SignalError::NoAgreement {
        count,
        total,
        needed: min_agreement,
    };
    if long == short || count < min_agreement {
        return Err(rejected);
    }

    let direction = if long > short { Direction::Long } else { Direction::Short };
    let agreeing: Vec<&Signal> = signals.iter().filter(|s| s.direction == direction).collect();

    let mut merged = agreeing[0].clone();
    merged.confidence = agreeing.iter().map(|s| s.confidence).sum::<f64>() / count as f64;
    merged.trade_type = TradeType::from_confidence(merged.confidence);
    merged.timeframe = agreeing
        .iter()
        .map(|s| s.timeframe.as_str())
        .collect::<Vec<_>>()
        .join("/");
    merged.agreement = count as f64 / total.max(1) as f64 * 100.0;
    Ok(merged)
}

/// Full multi-timeframe analysis of one symbol, including the 24h volume
/// gate.
pub async fn analyze_symbol(
    source: &dyn MarketDataSource,
    symbol: &str,
    settings: &AnalysisSettings,
    history: Option<&HitRates>,
) -> Result<Signal, SignalError> {
    let results = join_all(
        settings
            .timeframes
            .iter()
            .map(|tf| analyze_timeframe(source, symbol, tf, settings, history)),
    )
    .await;

    let mut signals = Vec::new();
    for (tf, result) in settings.timeframes.iter().zip(results) {
        match result {
            Ok(signal) => signals.push(signal),
            Err(e) => tracing::debug!("[{}] {} skipped: {}", symbol, tf, e),
        }
    }

    let mut signal = combine(&signals, settings.timeframes.len(), settings.min_agreement)?;

    let ticker = source
        .fetch_ticker(symbol)
        .await
        .map_err(|e| SignalError::Exchange(format!("{:#}", e)))?;
    let volume = ticker.effective_quote_volume();
    if volume < settings.min_quote_volume {
        return Err(SignalError::VolumeRejected {
            volume,
            min: settings.min_quote_volume,
        });
    }
    signal.quote_volume_24h = volume;

    tracing::info!(
        "[{}] {} agreed on {} ({:.0}%), confidence {:.2}",
        symbol,
        signal.direction,
        signal.timeframe,
        signal.agreement,
        signal.confidence
    );
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{candle, flat_series, oversold_reversal_series, series_from_closes, FakeMarketData};
    use chrono::Utc;
    use shared::SignalStatus;

    fn signal(tf: &str, direction: Direction, confidence: f64) -> Signal {
        Signal {
            id: None,
            symbol: "BTC/USDT".to_string(),
            direction,
            entry: 100.0,
            confidence,
            timeframe: tf.to_string(),
            conditions: vec!["Bullish MACD".to_string()],
            tp1: 101.0,
            tp2: 101.5,
            tp3: 102.0,
            sl: 99.0,
            tp1_possibility: 60.0,
            tp2_possibility: 42.0,
            tp3_possibility: 30.0,
            volume: 10.0,
            trade_type: TradeType::from_confidence(confidence),
            trade_duration: scorer::trade_duration(tf).to_string(),
            leverage: "20x".to_string(),
            quote_volume_24h: 0.0,
            agreement: 0.0,
            atr: 1.0,
            timestamp: Utc::now(),
            status: SignalStatus::Pending,
            hit_timestamp: None,
        }
    }

    #[test]
    fn test_two_of_four_agree() {
        let signals = vec![
            signal("15m", Direction::Long, 70.0),
            signal("4h", Direction::Long, 80.0),
        ];
        let merged = combine(&signals, 4, 2).unwrap();
        assert_eq!(merged.direction, Direction::Long);
        assert_eq!(merged.timeframe, "15m/4h");
        assert_eq!(merged.confidence, 75.0);
        assert_eq!(merged.trade_type, TradeType::Swing);
        assert_eq!(merged.agreement, 50.0);
        assert_eq!(merged.trade_duration, "Up to 1 hour");
    }

    #[test]
    fn test_majority_wins() {
        let signals = vec![
            signal("15m", Direction::Short, 70.0),
            signal("1h", Direction::Long, 72.0),
            signal("4h", Direction::Short, 74.0),
            signal("1d", Direction::Short, 90.0),
        ];
        let merged = combine(&signals, 4, 2).unwrap();
        assert_eq!(merged.direction, Direction::Short);
        assert_eq!(merged.timeframe, "15m/4h/1d");
        assert_eq!(merged.agreement, 75.0);
        assert!((merged.confidence - 78.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_timeframe_rejected() {
        let signals = vec![signal("1h", Direction::Long, 90.0)];
        assert_eq!(
            combine(&signals, 4, 2).unwrap_err(),
            SignalError::NoAgreement {
                count: 1,
                total: 4,
                needed: 2
            }
        );
        assert!(combine(&[], 4, 2).is_err());
    }

    #[test]
    fn test_tie_rejected() {
        let signals = vec![
            signal("15m", Direction::Long, 80.0),
            signal("1h", Direction::Long, 80.0),
            signal("4h", Direction::Short, 80.0),
            signal("1d", Direction::Short, 80.0),
        ];
        assert!(matches!(
            combine(&signals, 4, 2),
            Err(SignalError::NoAgreement { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_flat_market_yields_nothing() {
        let fake = FakeMarketData::new();
        for tf in ["15m", "1h", "4h", "1d"] {
            fake.set_candles("BTC/USDT", tf, flat_series(100, 50.0));
        }
        fake.set_quote_volume("BTC/USDT", 5_000_000.0);
        let err = analyze_symbol(&fake, "BTC/USDT", &AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::NoAgreement { count: 0, .. }));
    }

    #[tokio::test]
    async fn test_missing_candles_are_dropped() {
        let fake = FakeMarketData::new();
        fake.set_candles("BTC/USDT", "1h", series_from_closes(&[1.0; 10], 1.0));
        let err = analyze_symbol(&fake, "BTC/USDT", &AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::NoAgreement { .. }));

        let tf_err = analyze_timeframe(&fake, "BTC/USDT", "1h", &AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(tf_err, SignalError::InsufficientData { needed: 30, got: 10 }));

        let exchange_err = analyze_timeframe(&fake, "BTC/USDT", "4h", &AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(exchange_err, SignalError::Exchange(_)));
    }

    fn reversal_market(quote_volume: f64) -> FakeMarketData {
        let fake = FakeMarketData::new();
        fake.set_candles("BTC/USDT", "1h", oversold_reversal_series());
        fake.set_candles("BTC/USDT", "4h", oversold_reversal_series());
        fake.set_quote_volume("BTC/USDT", quote_volume);
        fake
    }

    #[tokio::test]
    async fn test_reversal_on_two_timeframes_is_accepted() {
        let fake = reversal_market(5_000_000.0);
        let signal = analyze_symbol(&fake, "BTC/USDT", &AnalysisSettings::default(), None)
            .await
            .unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.timeframe, "1h/4h");
        assert_eq!(signal.agreement, 50.0);
        assert_eq!(signal.quote_volume_24h, 5_000_000.0);
        assert!((signal.entry - 61.2).abs() < 1e-9);
        assert!(signal.confidence >= 70.0);
        assert!(signal.conditions.iter().any(|c| c == "Oversold RSI"));
        assert!(signal.conditions.iter().any(|c| c == "bullish_engulfing"));
        assert!(signal.conditions.iter().any(|c| c == "High Volume"));
        assert!(signal.sl < signal.entry && signal.entry < signal.tp1);
    }

    #[tokio::test]
    async fn test_low_quote_volume_is_rejected() {
        let fake = reversal_market(250_000.0);
        let err = analyze_symbol(&fake, "BTC/USDT", &AnalysisSettings::default(), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::VolumeRejected {
                volume: 250_000.0,
                min: 1_000_000.0
            }
        );
    }

    #[tokio::test]
    async fn test_thin_timeframe_volume_is_dropped() {
        let fake = reversal_market(5_000_000.0);
        let settings = AnalysisSettings {
            timeframe_volume_ratio: 5.0,
            ..AnalysisSettings::default()
        };
        let err = analyze_timeframe(&fake, "BTC/USDT", "1h", &settings, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::ThinVolume { ratio, .. } if ratio == 5.0));
        assert!(matches!(
            analyze_symbol(&fake, "BTC/USDT", &settings, None).await,
            Err(SignalError::NoAgreement { count: 0, .. })
        ));
    }

    #[test]
    fn test_fake_breakout() {
        let before = candle(0, 100.0, 101.0, 99.0, 100.5, 10.0);
        // Previous candle spiked above the last one.
        let spike = candle(1, 100.5, 103.0, 100.0, 101.0, 10.0);
        let last = candle(2, 101.0, 102.0, 100.5, 101.5, 10.0);
        assert!(is_fake_breakout(&[before, spike, last], Direction::Long));
        assert!(!is_fake_breakout(&[before, last, spike], Direction::Long));

        let dip = candle(1, 100.0, 100.5, 97.0, 99.0, 10.0);
        let low_last = candle(2, 99.0, 100.8, 98.0, 98.5, 10.0);
        assert!(is_fake_breakout(&[before, dip, low_last], Direction::Short));
        assert!(!is_fake_breakout(&[before, dip, low_last], Direction::Long));
        assert!(!is_fake_breakout(&[spike, last], Direction::Long));

        let set = indicators::calculate(&oversold_reversal_series()).unwrap();
        let mut candles = oversold_reversal_series();
        let n = candles.len();
        candles[n - 2].high = 70.0;
        let signal = signal("1h", Direction::Long, 80.0);
        assert_eq!(
            confirm_timeframe(signal.clone(), &candles, &set, 1.2).unwrap_err(),
            SignalError::FakeBreakout {
                direction: Direction::Long
            }
        );
        assert!(confirm_timeframe(signal, &oversold_reversal_series(), &set, 1.2).is_ok());
    }
}
