use serde::Serialize;

use crate::models::{Direction, HitRates, Signal, SignalStatus};

/// Aggregate statistics over a set of logged signals.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SignalSummary {
    pub total: usize,
    pub long: usize,
    pub short: usize,
    pub avg_confidence: f64,
    pub pending: usize,
    pub tp1: usize,
    pub tp2: usize,
    pub tp3: usize,
    pub sl: usize,
    pub hit_rates: HitRates,
}

impl SignalSummary {
    pub fn from_signals(signals: &[Signal]) -> Self {
        let mut summary = SignalSummary {
            total: signals.len(),
            ..Default::default()
        };
        if signals.is_empty() {
            return summary;
        }

        let mut confidence_sum = 0.0;
        for signal in signals {
            confidence_sum += signal.confidence;
            match signal.direction {
                Direction::Long => summary.long += 1,
                Direction::Short => summary.short += 1,
            }
            match signal.status {
                SignalStatus::Pending => summary.pending += 1,
                SignalStatus::Tp1 => summary.tp1 += 1,
                SignalStatus::Tp2 => summary.tp2 += 1,
                SignalStatus::Tp3 => summary.tp3 += 1,
                SignalStatus::Sl => summary.sl += 1,
            }
        }
        summary.avg_confidence = confidence_sum / signals.len() as f64;
        summary.hit_rates = hit_rates(signals.iter().map(|s| s.status));
        summary
    }

    pub fn resolved(&self) -> usize {
        self.total - self.pending
    }
}

/// Hit rates over resolved statuses. Reaching TP2 counts as a TP1 hit too,
/// and TP3 counts for all three targets.
pub fn hit_rates<I>(statuses: I) -> HitRates
where
    I: IntoIterator<Item = SignalStatus>,
{
    let mut resolved = 0usize;
    let (mut tp1, mut tp2, mut tp3, mut sl) = (0usize, 0usize, 0usize, 0usize);
    for status in statuses {
        if !status.is_resolved() {
            continue;
        }
        resolved += 1;
        if status.is_take_profit() {
            tp1 += 1;
        }
        if matches!(status, SignalStatus::Tp2 | SignalStatus::Tp3) {
            tp2 += 1;
        }
        if status == SignalStatus::Tp3 {
            tp3 += 1;
        }
        if status == SignalStatus::Sl {
            sl += 1;
        }
    }

    if resolved == 0 {
        return HitRates::default();
    }
    let pct = |n: usize| n as f64 / resolved as f64 * 100.0;
    HitRates {
        resolved,
        tp1: pct(tp1),
        tp2: pct(tp2),
        tp3: pct(tp3),
        sl: pct(sl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeType;
    use chrono::Utc;

    fn signal(direction: Direction, confidence: f64, status: SignalStatus) -> Signal {
        Signal {
            id: None,
            symbol: "BTC/USDT".to_string(),
            direction,
            entry: 100.0,
            confidence,
            timeframe: "1h".to_string(),
            conditions: vec!["Bullish MACD".to_string()],
            tp1: 101.0,
            tp2: 102.0,
            tp3: 103.0,
            sl: 99.0,
            tp1_possibility: 70.0,
            tp2_possibility: 49.0,
            tp3_possibility: 35.0,
            volume: 10.0,
            trade_type: TradeType::Normal,
            trade_duration: "Up to 6 hours".to_string(),
            leverage: "20x".to_string(),
            quote_volume_24h: 5_000_000.0,
            agreement: 75.0,
            atr: 0.5,
            timestamp: Utc::now(),
            status,
            hit_timestamp: None,
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = SignalSummary::from_signals(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.avg_confidence, 0.0);
        assert_eq!(summary.hit_rates, HitRates::default());
    }

    #[test]
    fn test_summary_counts_and_rates() {
        let signals = vec![
            signal(Direction::Long, 80.0, SignalStatus::Tp1),
            signal(Direction::Long, 70.0, SignalStatus::Tp3),
            signal(Direction::Short, 90.0, SignalStatus::Sl),
            signal(Direction::Short, 80.0, SignalStatus::Pending),
        ];
        let summary = SignalSummary::from_signals(&signals);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.long, 2);
        assert_eq!(summary.short, 2);
        assert_eq!(summary.resolved(), 3);
        assert!((summary.avg_confidence - 80.0).abs() < 1e-9);

        let rates = summary.hit_rates;
        assert_eq!(rates.resolved, 3);
        assert!((rates.tp1 - 200.0 / 3.0).abs() < 1e-9);
        assert!((rates.tp2 - 100.0 / 3.0).abs() < 1e-9);
        assert!((rates.tp3 - 100.0 / 3.0).abs() < 1e-9);
        assert!((rates.sl - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pending_only_has_no_rates() {
        let rates = hit_rates(vec![SignalStatus::Pending, SignalStatus::Pending]);
        assert_eq!(rates.resolved, 0);
        assert_eq!(rates.tp1, 0.0);
    }
}
