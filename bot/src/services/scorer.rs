use std::fmt;

use chrono::Utc;
use shared::{Direction, HitRates, ScoringConfig, Signal, SignalError, SignalStatus, TradeType};

use super::indicators::IndicatorSet;
use super::patterns::CandlePattern;

/// Boolean observation about the latest candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    OversoldRsi,
    OverboughtRsi,
    BullishMacd,
    BearishMacd,
    StrongTrend,
    AboveBollingerUpper,
    BelowBollingerLower,
    OversoldStochastic,
    OverboughtStochastic,
    AboveVwap,
    BelowVwap,
    NearSupport,
    NearResistance,
    HighVolume,
    Pattern(CandlePattern),
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::OversoldRsi => "Oversold RSI",
            Condition::OverboughtRsi => "Overbought RSI",
            Condition::BullishMacd => "Bullish MACD",
            Condition::BearishMacd => "Bearish MACD",
            Condition::StrongTrend => "Strong Trend",
            Condition::AboveBollingerUpper => "Above Bollinger Upper",
            Condition::BelowBollingerLower => "Below Bollinger Lower",
            Condition::OversoldStochastic => "Oversold Stochastic",
            Condition::OverboughtStochastic => "Overbought Stochastic",
            Condition::AboveVwap => "Above VWAP",
            Condition::BelowVwap => "Below VWAP",
            Condition::NearSupport => "Near Support",
            Condition::NearResistance => "Near Resistance",
            Condition::HighVolume => "High Volume",
            Condition::Pattern(p) => p.as_str(),
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            Condition::OversoldRsi
                | Condition::BullishMacd
                | Condition::Pattern(CandlePattern::BullishEngulfing)
                | Condition::Pattern(CandlePattern::Hammer)
                | Condition::Pattern(CandlePattern::ThreeWhiteSoldiers)
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(
            self,
            Condition::OverboughtRsi
                | Condition::BearishMacd
                | Condition::Pattern(CandlePattern::BearishEngulfing)
                | Condition::Pattern(CandlePattern::ShootingStar)
                | Condition::Pattern(CandlePattern::ThreeBlackCrows)
        )
    }

    fn is_macd(&self) -> bool {
        matches!(self, Condition::BullishMacd | Condition::BearishMacd)
    }

    fn is_level(&self) -> bool {
        matches!(self, Condition::NearSupport | Condition::NearResistance)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn evaluate_conditions(set: &IndicatorSet, cfg: &ScoringConfig) -> Vec<Condition> {
    let mut conditions = Vec::new();
    let close = set.close;

    if set.rsi < cfg.rsi_oversold {
        conditions.push(Condition::OversoldRsi);
    } else if set.rsi > cfg.rsi_overbought {
        conditions.push(Condition::OverboughtRsi);
    }

    if set.macd > set.macd_signal && set.macd > 0.0 {
        conditions.push(Condition::BullishMacd);
    } else if set.macd < set.macd_signal && set.macd < 0.0 {
        conditions.push(Condition::BearishMacd);
    }

    if set.adx > cfg.adx_strong_trend {
        conditions.push(Condition::StrongTrend);
    }

    if close > set.bollinger_upper {
        conditions.push(Condition::AboveBollingerUpper);
    } else if close < set.bollinger_lower {
        conditions.push(Condition::BelowBollingerLower);
    }

    if set.stoch_k < cfg.stoch_oversold {
        conditions.push(Condition::OversoldStochastic);
    } else if set.stoch_k > cfg.stoch_overbought {
        conditions.push(Condition::OverboughtStochastic);
    }

    if close > set.vwap {
        conditions.push(Condition::AboveVwap);
    } else if close < set.vwap {
        conditions.push(Condition::BelowVwap);
    }

    conditions.extend(set.patterns.iter().copied().map(Condition::Pattern));

    if close > 0.0 {
        if (close - set.support).abs() / close < cfg.near_level_pct {
            conditions.push(Condition::NearSupport);
        }
        if (close - set.resistance).abs() / close < cfg.near_level_pct {
            conditions.push(Condition::NearResistance);
        }
    }

    if set.volume > set.volume_sma_20 * cfg.high_volume_ratio {
        conditions.push(Condition::HighVolume);
    }

    conditions
}

pub fn confidence(conditions: &[Condition], cfg: &ScoringConfig) -> f64 {
    let has = |pred: fn(&Condition) -> bool| conditions.iter().any(pred);

    let mut score = cfg.base_confidence;
    if has(Condition::is_macd) {
        score += cfg.weight_macd;
    }
    if conditions
        .iter()
        .any(|c| matches!(c, Condition::Pattern(p) if p.is_reversal()))
    {
        score += cfg.weight_pattern;
    }
    if conditions.contains(&Condition::StrongTrend) {
        score += cfg.weight_trend;
    }
    if has(Condition::is_level) {
        score += cfg.weight_level;
    }
    if conditions.contains(&Condition::HighVolume) {
        score += cfg.weight_volume;
    }
    score.min(cfg.max_confidence)
}

pub fn is_stablecoin_quoted(symbol: &str) -> bool {
    symbol.contains("USDT") && symbol != "USDT/USD"
}

/// TP1..TP3 and SL for an entry.
pub fn price_levels(
    symbol: &str,
    direction: Direction,
    entry: f64,
    atr: f64,
    cfg: &ScoringConfig,
) -> ([f64; 3], f64) {
    let sign = direction.sign();
    let capped = is_stablecoin_quoted(symbol);
    let mut tps = [0.0; 3];
    for (i, tp) in tps.iter_mut().enumerate() {
        let mut distance = (cfg.tp_pct[i] * entry).max(cfg.tp_atr_mult[i] * atr);
        if capped {
            distance = distance.min(cfg.stablecoin_tp_cap[i] * entry);
        }
        *tp = entry + sign * distance;
    }
    let sl = entry - sign * cfg.sl_pct * entry;
    (tps, sl)
}

/// Heuristic TP hit chances, optionally blended with the symbol's
/// historical hit rates.
pub fn tp_possibilities(
    conditions: &[Condition],
    history: Option<&HitRates>,
    cfg: &ScoringConfig,
) -> [f64; 3] {
    let mut base: f64 = 50.0;
    if conditions.iter().any(Condition::is_macd) {
        base += 10.0;
    }
    if conditions.contains(&Condition::StrongTrend) {
        base += 10.0;
    }
    if conditions.iter().any(Condition::is_level) {
        base -= 5.0;
    }
    let heuristic = [base.min(80.0), (base * 0.7).min(60.0), (base * 0.5).min(40.0)];

    match history {
        Some(h) if h.resolved >= cfg.min_history_for_hit_rates => [
            (heuristic[0] + h.tp1) / 2.0,
            (heuristic[1] + h.tp2) / 2.0,
            (heuristic[2] + h.tp3) / 2.0,
        ],
        _ => heuristic,
    }
}

pub fn leverage(conditions: &[Condition]) -> String {
    let mut score = 0;
    if conditions.iter().any(Condition::is_macd) {
        score += 2;
    }
    if conditions.contains(&Condition::StrongTrend) {
        score += 2;
    }
    if conditions
        .iter()
        .any(|c| matches!(c, Condition::AboveVwap | Condition::BelowVwap))
    {
        score += 1;
    }
    if conditions
        .iter()
        .any(|c| matches!(c, Condition::OversoldStochastic | Condition::OverboughtStochastic))
    {
        score -= 1;
    }
    let lev = match score {
        s if s >= 5 => "40x",
        s if s >= 3 => "30x",
        s if s >= 1 => "20x",
        _ => "10x",
    };
    lev.to_string()
}

pub fn trade_duration(timeframe: &str) -> &'static str {
    match timeframe {
        "5m" | "15m" => "Up to 1 hour",
        "1h" => "Up to 6 hours",
        "4h" => "Up to 24 hours",
        "1d" => "Up to 3 days",
        _ => "Unknown",
    }
}

/// Scores one timeframe's indicators into a signal.
pub fn score(
    symbol: &str,
    timeframe: &str,
    set: &IndicatorSet,
    cfg: &ScoringConfig,
    history: Option<&HitRates>,
) -> Result<Signal, SignalError> {
    let entry = set.close;
    if !entry.is_finite() || entry <= 0.0 {
        return Err(SignalError::InvalidData(format!("entry price {}", entry)));
    }

    let conditions = evaluate_conditions(set, cfg);
    let bullish = conditions.iter().filter(|c| c.is_bullish()).count();
    let bearish = conditions.iter().filter(|c| c.is_bearish()).count();
    let no_direction = SignalError::NoDirection {
        bullish,
        bearish,
        matched: conditions.len(),
    };
    if conditions.len() < cfg.min_conditions || bullish == bearish {
        return Err(no_direction);
    }
    let direction = if bullish > bearish {
        Direction::Long
    } else {
        Direction::Short
    };

    let confidence = confidence(&conditions, cfg);
    if confidence < cfg.min_confidence {
        return Err(SignalError::BelowConfidenceThreshold {
            confidence,
            min: cfg.min_confidence,
        });
    }

    let atr = set.atr.max(cfg.atr_floor_pct * entry);
    let ([tp1, tp2, tp3], sl) = price_levels(symbol, direction, entry, atr, cfg);
    let [p1, p2, p3] = tp_possibilities(&conditions, history, cfg);

    tracing::debug!(
        "[{}] {} {} conf {:.2} conditions: {}",
        symbol,
        timeframe,
        direction,
        confidence,
        conditions.iter().map(Condition::as_str).collect::<Vec<_>>().join(", ")
    );

    Ok(Signal {
        id: None,
        symbol: symbol.to_string(),
        direction,
        entry,
        confidence,
        timeframe: timeframe.to_string(),
        conditions: conditions.iter().map(|c| c.as_str().to_string()).collect(),
        tp1,
        tp2,
        tp3,
        sl,
        tp1_possibility: p1,
        tp2_possibility: p2,
        tp3_possibility: p3,
        volume: set.volume,
        trade_type: TradeType::from_confidence(confidence),
        trade_duration: trade_duration(timeframe).to_string(),
        leverage: leverage(&conditions),
        quote_volume_24h: 0.0,
        agreement: 0.0,
        atr,
        timestamp: Utc::now(),
        status: SignalStatus::Pending,
        hit_timestamp: None,
    })
}
