use anyhow::Result;
use shared::report::hit_rates;
use shared::templates::BacktestReportTemplate;
use shared::{Direction, HitRates, ScoringConfig, Signal, SignalStatus};

use super::indicators;
use super::market_data::{Candle, MarketDataSource};
use super::scorer;

/// Positions replayed, counted back from the last fully observable candle.
pub const POSITIONS: usize = 50;
/// Candles after a signal used to judge its outcome.
pub const LOOKAHEAD: usize = 10;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BacktestReport {
    pub symbol: String,
    pub timeframe: String,
    pub candles: usize,
    pub positions: usize,
    pub signals: usize,
    pub long: usize,
    pub short: usize,
    pub tp1: usize,
    pub tp2: usize,
    pub tp3: usize,
    pub sl: usize,
    pub pending: usize,
    pub hit_rates: HitRates,
}

impl BacktestReport {
    pub fn template(&self) -> BacktestReportTemplate {
        BacktestReportTemplate {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            candles: self.candles,
            positions: self.positions,
            signals: self.signals,
            long: self.long,
            short: self.short,
            tp1: self.tp1,
            tp2: self.tp2,
            tp3: self.tp3,
            sl: self.sl,
            pending: self.pending,
            resolved: self.hit_rates.resolved,
            tp1_rate: format!("{:.1}", self.hit_rates.tp1),
            tp2_rate: format!("{:.1}", self.hit_rates.tp2),
            tp3_rate: format!("{:.1}", self.hit_rates.tp3),
            sl_rate: format!("{:.1}", self.hit_rates.sl),
        }
    }
}

/// Outcome of a signal given the candles that followed it: the highest TP
/// reached by any wick, else SL, else still pending.
pub fn classify_outcome(signal: &Signal, future: &[Candle]) -> SignalStatus {
    if future.is_empty() {
        return SignalStatus::Pending;
    }
    let best = match signal.direction {
        Direction::Long => future.iter().map(|c| c.high).fold(f64::MIN, f64::max),
        Direction::Short => future.iter().map(|c| c.low).fold(f64::MAX, f64::min),
    };
    let worst = match signal.direction {
        Direction::Long => future.iter().map(|c| c.low).fold(f64::MAX, f64::min),
        Direction::Short => future.iter().map(|c| c.high).fold(f64::MIN, f64::max),
    };
    let sign = signal.direction.sign();
    let reached = |level: f64| (best - level) * sign >= 0.0;

    if reached(signal.tp3) {
        SignalStatus::Tp3
    } else if reached(signal.tp2) {
        SignalStatus::Tp2
    } else if reached(signal.tp1) {
        SignalStatus::Tp1
    } else if (signal.sl - worst) * sign >= 0.0 {
        SignalStatus::Sl
    } else {
        SignalStatus::Pending
    }
}

/// Replays the single-timeframe scorer over `candles`.
pub fn replay(symbol: &str, timeframe: &str, candles: &[Candle], window: usize, cfg: &ScoringConfig) -> BacktestReport {
    let mut report = BacktestReport {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        candles: candles.len(),
        ..Default::default()
    };
    if candles.len() <= LOOKAHEAD {
        return report;
    }

    let last = candles.len() - LOOKAHEAD;
    let first = last.saturating_sub(POSITIONS).max(indicators::MIN_CANDLES);
    let mut statuses = Vec::new();
    for end in first..last {
        report.positions += 1;
        let start = end.saturating_sub(window);
        let set = match indicators::calculate(&candles[start..end]) {
            Ok(set) => set,
            Err(e) => {
                tracing::debug!("[{}] backtest position {} skipped: {}", symbol, end, e);
                continue;
            }
        };
        let Ok(signal) = scorer::score(symbol, timeframe, &set, cfg, None) else {
            continue;
        };

        report.signals += 1;
        match signal.direction {
            Direction::Long => report.long += 1,
            Direction::Short => report.short += 1,
        }
        let status = classify_outcome(&signal, &candles[end..end + LOOKAHEAD]);
        match status {
            SignalStatus::Pending => report.pending += 1,
            SignalStatus::Tp1 => report.tp1 += 1,
            SignalStatus::Tp2 => report.tp2 += 1,
            SignalStatus::Tp3 => report.tp3 += 1,
            SignalStatus::Sl => report.sl += 1,
        }
        statuses.push(status);
    }
    report.hit_rates = hit_rates(statuses);
    report
}

pub async fn run_backtest(
    source: &dyn MarketDataSource,
    symbol: &str,
    timeframe: &str,
    window: usize,
    cfg: &ScoringConfig,
) -> Result<BacktestReport> {
    let limit = window + POSITIONS + LOOKAHEAD;
    let candles = source.fetch_candles(symbol, timeframe, limit).await?;
    tracing::info!("[{}] Backtesting {} over {} candles", symbol, timeframe, candles.len());
    Ok(replay(symbol, timeframe, &candles, window, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::signal_repository::tests::sample_signal;
    use crate::services::testing::{candle, flat_series, FakeMarketData};
    use askama::Template;
    use chrono::Utc;

    fn wick(i: i64, high: f64, low: f64) -> Candle {
        candle(i, 100.0, high, low, 100.0, 10.0)
    }

    #[test]
    fn test_classify_long() {
        // entry 100, tp 101/101.5/102, sl 99
        let s = sample_signal("BTC/USDT", Utc::now());
        assert_eq!(classify_outcome(&s, &[wick(0, 100.5, 99.5)]), SignalStatus::Pending);
        assert_eq!(classify_outcome(&s, &[wick(0, 101.2, 99.5)]), SignalStatus::Tp1);
        assert_eq!(
            classify_outcome(&s, &[wick(0, 101.2, 99.5), wick(1, 102.3, 99.5)]),
            SignalStatus::Tp3
        );
        assert_eq!(classify_outcome(&s, &[wick(0, 100.2, 98.7)]), SignalStatus::Sl);
        // A target reached wins over a stop in the same window.
        assert_eq!(
            classify_outcome(&s, &[wick(0, 100.2, 98.7), wick(1, 101.6, 99.5)]),
            SignalStatus::Tp2
        );
        assert_eq!(classify_outcome(&s, &[]), SignalStatus::Pending);
    }

    #[test]
    fn test_classify_short() {
        let s = Signal {
            direction: Direction::Short,
            tp1: 99.0,
            tp2: 98.5,
            tp3: 98.0,
            sl: 101.0,
            ..sample_signal("BTC/USDT", Utc::now())
        };
        assert_eq!(classify_outcome(&s, &[wick(0, 100.5, 98.9)]), SignalStatus::Tp1);
        assert_eq!(classify_outcome(&s, &[wick(0, 101.5, 99.5)]), SignalStatus::Sl);
    }

    #[test]
    fn test_replay_flat_market() {
        let candles = flat_series(200, 10.0);
        let report = replay("BTC/USDT", "1h", &candles, 100, &ScoringConfig::standard());
        assert_eq!(report.candles, 200);
        assert_eq!(report.positions, POSITIONS);
        assert_eq!(report.signals, 0);
        assert_eq!(report.hit_rates.resolved, 0);
    }

    #[test]
    fn test_replay_short_history() {
        let report = replay("BTC/USDT", "1h", &flat_series(8, 10.0), 100, &ScoringConfig::standard());
        assert_eq!(report.positions, 0);

        // Fewer positions than requested when history is thin.
        let report = replay("BTC/USDT", "1h", &flat_series(45, 10.0), 100, &ScoringConfig::standard());
        assert_eq!(report.positions, 5);
    }

    #[tokio::test]
    async fn test_run_backtest_renders() {
        let source = FakeMarketData::new();
        source.set_candles("ETH/USDT", "4h", flat_series(300, 10.0));
        let report = run_backtest(&source, "ETH/USDT", "4h", 100, &ScoringConfig::standard())
            .await
            .unwrap();
        assert_eq!(report.candles, 160);
        let text = report.template().render().unwrap();
        assert!(text.contains("ETH/USDT"));
    }
}
