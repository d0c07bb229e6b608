use shared::SignalError;
use ta::indicators::{
    BollingerBands, FastStochastic, MovingAverageConvergenceDivergence, SimpleMovingAverage, TrueRange,
};
use ta::{Close, DataItem, High, Low, Next, Volume};

use super::market_data::{validate_candles, Candle};
use super::patterns::{detect_patterns, CandlePattern};

pub const MIN_CANDLES: usize = 30;

/// Scale applied to closes before MACD so tiny-priced assets keep precision.
const MACD_SCALE: f64 = 1000.0;

/// Indicator values for the latest candle of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub close: f64,
    pub volume: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub atr: f64,
    pub adx: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub vwap: f64,
    pub volume_sma_20: f64,
    pub support: f64,
    pub resistance: f64,
    pub fib_382: f64,
    pub fib_618: f64,
    pub patterns: Vec<CandlePattern>,
    pub candle_count: usize,
}

/// Relative Strength Index with Wilder smoothing of the average gain and
/// loss. Reads 50 until `period` changes have been seen.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Result<Self, SignalError> {
        if period == 0 {
            return Err(SignalError::InvalidData("RSI period must be positive".to_string()));
        }
        Ok(Self {
            period,
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }
}

impl Next<f64> for WilderRsi {
    type Output = f64;

    fn next(&mut self, close: f64) -> f64 {
        let Some(prev) = self.prev_close.replace(close) else {
            return 50.0;
        };
        let change = close - prev;
        let (gain, loss) = (change.max(0.0), (-change).max(0.0));

        self.changes += 1;
        let period = self.period as f64;
        if self.changes <= self.period {
            // Seed with the simple mean of the first `period` changes.
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
            if self.changes < self.period {
                return 50.0;
            }
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        if self.avg_loss <= 0.0 {
            if self.avg_gain <= 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + self.avg_gain / self.avg_loss)
        }
    }
}

/// Average Directional Index with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct AverageDirectionalIndex {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    samples: usize,
    smoothed_tr: f64,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    dx_sum: f64,
    dx_count: usize,
    adx: Option<f64>,
}

impl AverageDirectionalIndex {
    pub fn new(period: usize) -> Result<Self, SignalError> {
        if period == 0 {
            return Err(SignalError::InvalidData("ADX period must be positive".to_string()));
        }
        Ok(Self {
            period,
            prev: None,
            samples: 0,
            smoothed_tr: 0.0,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            dx_sum: 0.0,
            dx_count: 0,
            adx: None,
        })
    }

    fn dx(&self) -> f64 {
        if self.smoothed_tr <= 0.0 {
            return 0.0;
        }
        let plus_di = 100.0 * self.smoothed_plus_dm / self.smoothed_tr;
        let minus_di = 100.0 * self.smoothed_minus_dm / self.smoothed_tr;
        let sum = plus_di + minus_di;
        if sum <= 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        }
    }
}

impl<T: High + Low + Close> Next<&T> for AverageDirectionalIndex {
    type Output = f64;

    fn next(&mut self, input: &T) -> f64 {
        let (high, low, close) = (input.high(), input.low(), input.close());
        let Some((prev_high, prev_low, prev_close)) = self.prev.replace((high, low, close)) else {
            return 0.0;
        };

        let up = high - prev_high;
        let down = prev_low - low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        self.samples += 1;
        let period = self.period as f64;
        if self.samples <= self.period {
            self.smoothed_tr += tr;
            self.smoothed_plus_dm += plus_dm;
            self.smoothed_minus_dm += minus_dm;
            if self.samples < self.period {
                return 0.0;
            }
        } else {
            self.smoothed_tr = self.smoothed_tr - self.smoothed_tr / period + tr;
            self.smoothed_plus_dm = self.smoothed_plus_dm - self.smoothed_plus_dm / period + plus_dm;
            self.smoothed_minus_dm = self.smoothed_minus_dm - self.smoothed_minus_dm / period + minus_dm;
        }

        let dx = self.dx();
        match self.adx {
            Some(adx) => {
                let next = (adx * (period - 1.0) + dx) / period;
                self.adx = Some(next);
                next
            }
            None => {
                self.dx_sum += dx;
                self.dx_count += 1;
                let avg = self.dx_sum / self.dx_count as f64;
                if self.dx_count >= self.period {
                    self.adx = Some(avg);
                }
                avg
            }
        }
    }
}

/// Cumulative volume-weighted average of the typical price.
#[derive(Debug, Clone, Default)]
pub struct VolumeWeightedAveragePrice {
    price_volume: f64,
    volume: f64,
}

impl VolumeWeightedAveragePrice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: High + Low + Close + Volume> Next<&T> for VolumeWeightedAveragePrice {
    type Output = f64;

    fn next(&mut self, input: &T) -> f64 {
        let typical = (input.high() + input.low() + input.close()) / 3.0;
        self.price_volume += typical * input.volume();
        self.volume += input.volume();
        if self.volume > 0.0 {
            self.price_volume / self.volume
        } else {
            typical
        }
    }
}

fn to_data_item(candle: &Candle) -> Result<DataItem, SignalError> {
    DataItem::builder()
        .open(candle.open)
        .high(candle.high)
        .low(candle.low)
        .close(candle.close)
        .volume(candle.volume)
        .build()
        .map_err(|e| SignalError::InvalidData(format!("candle at {}: {:?}", candle.timestamp, e)))
}

fn ta_err(e: ta::errors::TaError) -> SignalError {
    SignalError::InvalidData(format!("indicator setup failed: {:?}", e))
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Computes the indicator set for the last candle of `candles`.
pub fn calculate(candles: &[Candle]) -> Result<IndicatorSet, SignalError> {
    if candles.len() < MIN_CANDLES {
        return Err(SignalError::InsufficientData {
            needed: MIN_CANDLES,
            got: candles.len(),
        });
    }
    validate_candles(candles)?;

    let mut rsi = WilderRsi::new(14)?;
    let mut macd = MovingAverageConvergenceDivergence::new(12, 26, 9).map_err(ta_err)?;
    let mut true_range = TrueRange::new();
    let mut atr = SimpleMovingAverage::new(14).map_err(ta_err)?;
    let mut bb = BollingerBands::new(20, 2.0).map_err(ta_err)?;
    let mut stoch = FastStochastic::new(14).map_err(ta_err)?;
    let mut stoch_d = SimpleMovingAverage::new(3).map_err(ta_err)?;
    let mut volume_sma = SimpleMovingAverage::new(20).map_err(ta_err)?;
    let mut adx = AverageDirectionalIndex::new(14)?;
    let mut vwap = VolumeWeightedAveragePrice::new();

    let (mut rsi_v, mut atr_v, mut k_v, mut d_v, mut vol_sma_v, mut adx_v, mut vwap_v) =
        (50.0, 0.0, 50.0, 50.0, 0.0, 0.0, 0.0);
    let mut macd_v = None;
    let mut bb_v = None;
    for candle in candles {
        let item = to_data_item(candle)?;
        rsi_v = rsi.next(candle.close);
        macd_v = Some(macd.next(candle.close * MACD_SCALE));
        atr_v = atr.next(true_range.next(&item));
        bb_v = Some(bb.next(candle.close));
        k_v = stoch.next(&item);
        d_v = stoch_d.next(k_v);
        vol_sma_v = volume_sma.next(candle.volume);
        adx_v = adx.next(&item);
        vwap_v = vwap.next(&item);
    }

    let last = candles[candles.len() - 1];
    let close = last.close;
    let (macd_line, macd_signal, macd_hist) = macd_v
        .map(|m| (m.macd / MACD_SCALE, m.signal / MACD_SCALE, m.histogram / MACD_SCALE))
        .unwrap_or((0.0, 0.0, 0.0));
    let (bb_upper, bb_middle, bb_lower) = bb_v
        .map(|b| (b.upper, b.average, b.lower))
        .unwrap_or((close, close, close));
    let (support, resistance) = support_resistance(candles);
    let (fib_382, fib_618) = fibonacci_levels(candles);

    Ok(IndicatorSet {
        close,
        volume: last.volume,
        rsi: finite_or(rsi_v, 50.0).clamp(0.0, 100.0),
        macd: finite_or(macd_line, 0.0),
        macd_signal: finite_or(macd_signal, 0.0),
        macd_histogram: finite_or(macd_hist, 0.0),
        atr: finite_or(atr_v, 0.0).max(0.0),
        adx: finite_or(adx_v, 0.0).clamp(0.0, 100.0),
        bollinger_upper: finite_or(bb_upper, close),
        bollinger_middle: finite_or(bb_middle, close),
        bollinger_lower: finite_or(bb_lower, close),
        stoch_k: finite_or(k_v, 50.0),
        stoch_d: finite_or(d_v, 50.0),
        vwap: finite_or(vwap_v, close),
        volume_sma_20: finite_or(vol_sma_v, last.volume),
        support,
        resistance,
        fib_382,
        fib_618,
        patterns: detect_patterns(candles),
        candle_count: candles.len(),
    })
}

/// Mean of 5-bar pivot lows/highs over the last 100 candles. Falls back to
/// ±1% of the close when the levels are unusable.
pub fn support_resistance(candles: &[Candle]) -> (f64, f64) {
    let Some(last) = candles.last() else {
        return (0.0, 0.0);
    };
    let close = last.close;
    let fallback = (close * 0.99, close * 1.01);

    let recent = &candles[candles.len().saturating_sub(100)..];
    if recent.len() < 20 {
        return fallback;
    }

    let mut pivot_highs = Vec::new();
    let mut pivot_lows = Vec::new();
    for i in 2..recent.len() - 2 {
        let window = &recent[i - 2..=i + 2];
        let max_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let min_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        if recent[i].high == max_high {
            pivot_highs.push(recent[i].high);
        }
        if recent[i].low == min_low {
            pivot_lows.push(recent[i].low);
        }
    }

    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    let resistance = if pivot_highs.is_empty() {
        recent.iter().map(|c| c.high).fold(f64::MIN, f64::max)
    } else {
        mean(&pivot_highs)
    };
    let support = if pivot_lows.is_empty() {
        recent.iter().map(|c| c.low).fold(f64::MAX, f64::min)
    } else {
        mean(&pivot_lows)
    };

    if (resistance - support).abs() < 0.002 * close
        || support <= 0.001
        || resistance <= 0.001
        || support >= resistance
    {
        return fallback;
    }
    (support, resistance)
}

/// 38.2% and 61.8% retracements of the last 100 candles' range. Both
/// collapse to the close when the range is under 1% of the low.
pub fn fibonacci_levels(candles: &[Candle]) -> (f64, f64) {
    let Some(last) = candles.last() else {
        return (0.0, 0.0);
    };
    let recent = &candles[candles.len().saturating_sub(100)..];
    let max_high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let min_low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let diff = max_high - min_low;
    if !diff.is_finite() || diff < 0.01 * min_low {
        return (last.close, last.close);
    }
    (min_low + 0.382 * diff, min_low + 0.618 * diff)
}
