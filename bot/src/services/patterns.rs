use std::fmt;

use super::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    Doji,
    Hammer,
    ShootingStar,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
}

impl CandlePattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandlePattern::BullishEngulfing => "bullish_engulfing",
            CandlePattern::BearishEngulfing => "bearish_engulfing",
            CandlePattern::Doji => "doji",
            CandlePattern::Hammer => "hammer",
            CandlePattern::ShootingStar => "shooting_star",
            CandlePattern::ThreeWhiteSoldiers => "three_white_soldiers",
            CandlePattern::ThreeBlackCrows => "three_black_crows",
        }
    }

    /// Single/double candle reversal shapes that add to signal confidence.
    pub fn is_reversal(&self) -> bool {
        matches!(
            self,
            CandlePattern::BullishEngulfing
                | CandlePattern::BearishEngulfing
                | CandlePattern::Hammer
                | CandlePattern::ShootingStar
        )
    }
}

impl fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn upper_shadow(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_shadow(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_green(c: &Candle) -> bool {
    c.close > c.open
}

fn is_red(c: &Candle) -> bool {
    c.close < c.open
}

fn bullish_engulfing(prev: &Candle, cur: &Candle) -> bool {
    is_red(prev) && is_green(cur) && cur.open <= prev.close && cur.close >= prev.open
}

fn bearish_engulfing(prev: &Candle, cur: &Candle) -> bool {
    is_green(prev) && is_red(cur) && cur.open >= prev.close && cur.close <= prev.open
}

fn doji(c: &Candle) -> bool {
    range(c) > 0.0 && body(c) <= range(c) * 0.1
}

fn hammer(c: &Candle) -> bool {
    range(c) > 0.0 && lower_shadow(c) >= 2.0 * body(c) && upper_shadow(c) <= 0.5 * body(c)
}

fn shooting_star(c: &Candle) -> bool {
    range(c) > 0.0 && upper_shadow(c) >= 2.0 * body(c) && lower_shadow(c) <= 0.5 * body(c)
}

/// Mean volume of the 20 candles ending at the last one, if there are 20.
fn avg_volume_20(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 20 {
        return None;
    }
    let window = &candles[candles.len() - 20..];
    Some(window.iter().map(|c| c.volume).sum::<f64>() / 20.0)
}

fn mean_range(candles: &[Candle]) -> f64 {
    candles.iter().map(range).sum::<f64>() / candles.len() as f64
}

fn three_white_soldiers(candles: &[Candle]) -> bool {
    let n = candles.len();
    let (c1, c2, c3) = (&candles[n - 3], &candles[n - 2], &candles[n - 1]);
    let Some(avg_volume) = avg_volume_20(candles) else {
        return false;
    };
    is_green(c1)
        && is_green(c2)
        && is_green(c3)
        && c2.close > c1.close
        && c3.close > c2.close
        && c2.open > c1.open
        && c3.open > c2.open
        && c3.volume > avg_volume
        && c3.close - c3.open > mean_range(candles) * 0.5
}

fn three_black_crows(candles: &[Candle]) -> bool {
    let n = candles.len();
    let (c1, c2, c3) = (&candles[n - 3], &candles[n - 2], &candles[n - 1]);
    let Some(avg_volume) = avg_volume_20(candles) else {
        return false;
    };
    is_red(c1)
        && is_red(c2)
        && is_red(c3)
        && c2.close < c1.close
        && c3.close < c2.close
        && c2.open < c1.open
        && c3.open < c2.open
        && c3.volume > avg_volume
        && c3.open - c3.close > mean_range(candles) * 0.5
}

/// Patterns completed by the last candle of the series.
pub fn detect_patterns(candles: &[Candle]) -> Vec<CandlePattern> {
    let mut patterns = Vec::new();
    let Some(last) = candles.last() else {
        return patterns;
    };

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if bullish_engulfing(prev, last) {
            patterns.push(CandlePattern::BullishEngulfing);
        }
        if bearish_engulfing(prev, last) {
            patterns.push(CandlePattern::BearishEngulfing);
        }
    }
    if doji(last) {
        patterns.push(CandlePattern::Doji);
    }
    if hammer(last) {
        patterns.push(CandlePattern::Hammer);
    }
    if shooting_star(last) {
        patterns.push(CandlePattern::ShootingStar);
    }
    if candles.len() >= 3 {
        if three_white_soldiers(candles) {
            patterns.push(CandlePattern::ThreeWhiteSoldiers);
        }
        if three_black_crows(candles) {
            patterns.push(CandlePattern::ThreeBlackCrows);
        }
    }
    patterns
}
