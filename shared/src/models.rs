use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};

use crate::entity::signals;
use crate::error::SignalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for LONG, -1 for SHORT. Multiply a distance by this to move
    /// towards profit.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Direction {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(SignalError::InvalidData(format!("unknown direction: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    Scalping,
    Normal,
    Swing,
}

impl TradeType {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 75.0 {
            TradeType::Swing
        } else if confidence >= 60.0 {
            TradeType::Normal
        } else {
            TradeType::Scalping
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeType::Scalping => "Scalping",
            TradeType::Normal => "Normal",
            TradeType::Swing => "Swing",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TradeType {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scalping" => Ok(TradeType::Scalping),
            "normal" => Ok(TradeType::Normal),
            "swing" => Ok(TradeType::Swing),
            other => Err(SignalError::InvalidData(format!("unknown trade type: {}", other))),
        }
    }
}

/// Outcome of a dispatched signal. Ordered by progress: a tracked signal
/// only ever moves forward through `Pending < Tp1 < Tp2 < Tp3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Tp1,
    Tp2,
    Tp3,
    Sl,
}

impl SignalStatus {
    pub fn is_resolved(self) -> bool {
        self != SignalStatus::Pending
    }

    pub fn is_take_profit(self) -> bool {
        matches!(self, SignalStatus::Tp1 | SignalStatus::Tp2 | SignalStatus::Tp3)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Tp1 => "tp1",
            SignalStatus::Tp2 => "tp2",
            SignalStatus::Tp3 => "tp3",
            SignalStatus::Sl => "sl",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SignalStatus {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SignalStatus::Pending),
            "tp1" => Ok(SignalStatus::Tp1),
            "tp2" => Ok(SignalStatus::Tp2),
            "tp3" => Ok(SignalStatus::Tp3),
            "sl" => Ok(SignalStatus::Sl),
            other => Err(SignalError::InvalidData(format!("unknown status: {}", other))),
        }
    }
}

/// A proposed trade produced by the scorer and, once dispatched, a row in
/// the `signals` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: Option<i32>,
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub confidence: f64,
    pub timeframe: String,
    pub conditions: Vec<String>,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub sl: f64,
    pub tp1_possibility: f64,
    pub tp2_possibility: f64,
    pub tp3_possibility: f64,
    /// Volume of the latest candle of the scored timeframe.
    pub volume: f64,
    pub trade_type: TradeType,
    pub trade_duration: String,
    pub leverage: String,
    pub quote_volume_24h: f64,
    /// Percentage of analysed timeframes agreeing on `direction`.
    pub agreement: f64,
    pub atr: f64,
    pub timestamp: DateTime<Utc>,
    pub status: SignalStatus,
    pub hit_timestamp: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn take_profits(&self) -> [f64; 3] {
        [self.tp1, self.tp2, self.tp3]
    }

    /// Distance from entry to `price` in percent, positive towards profit.
    pub fn profit_pct(&self, price: f64) -> f64 {
        if self.entry == 0.0 {
            return 0.0;
        }
        (price - self.entry) / self.entry * 100.0 * self.direction.sign()
    }

    pub fn conditions_joined(&self) -> String {
        self.conditions.join(", ")
    }

    pub fn to_active_model(&self) -> signals::ActiveModel {
        signals::ActiveModel {
            id: match self.id {
                Some(id) => ActiveValue::Set(id),
                None => ActiveValue::NotSet,
            },
            symbol: ActiveValue::Set(self.symbol.clone()),
            direction: ActiveValue::Set(self.direction.to_string()),
            entry: ActiveValue::Set(self.entry),
            confidence: ActiveValue::Set(self.confidence),
            timeframe: ActiveValue::Set(self.timeframe.clone()),
            conditions: ActiveValue::Set(self.conditions_joined()),
            tp1: ActiveValue::Set(self.tp1),
            tp2: ActiveValue::Set(self.tp2),
            tp3: ActiveValue::Set(self.tp3),
            sl: ActiveValue::Set(self.sl),
            tp1_possibility: ActiveValue::Set(self.tp1_possibility),
            tp2_possibility: ActiveValue::Set(self.tp2_possibility),
            tp3_possibility: ActiveValue::Set(self.tp3_possibility),
            volume: ActiveValue::Set(self.volume),
            trade_type: ActiveValue::Set(self.trade_type.to_string()),
            trade_duration: ActiveValue::Set(self.trade_duration.clone()),
            leverage: ActiveValue::Set(self.leverage.clone()),
            quote_volume_24h: ActiveValue::Set(self.quote_volume_24h),
            agreement: ActiveValue::Set(self.agreement),
            atr: ActiveValue::Set(self.atr),
            status: ActiveValue::Set(self.status.to_string()),
            created_at: ActiveValue::Set(self.timestamp),
            hit_timestamp: ActiveValue::Set(self.hit_timestamp),
        }
    }
}

impl TryFrom<signals::Model> for Signal {
    type Error = SignalError;

    fn try_from(model: signals::Model) -> Result<Self, Self::Error> {
        let conditions = model
            .conditions
            .split(", ")
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .collect();

        Ok(Signal {
            id: Some(model.id),
            symbol: model.symbol,
            direction: model.direction.parse()?,
            entry: model.entry,
            confidence: model.confidence,
            timeframe: model.timeframe,
            conditions,
            tp1: model.tp1,
            tp2: model.tp2,
            tp3: model.tp3,
            sl: model.sl,
            tp1_possibility: model.tp1_possibility,
            tp2_possibility: model.tp2_possibility,
            tp3_possibility: model.tp3_possibility,
            volume: model.volume,
            trade_type: model.trade_type.parse()?,
            trade_duration: model.trade_duration,
            leverage: model.leverage,
            quote_volume_24h: model.quote_volume_24h,
            agreement: model.agreement,
            atr: model.atr,
            timestamp: model.created_at,
            status: model.status.parse()?,
            hit_timestamp: model.hit_timestamp,
        })
    }
}

/// Approximate hit rates (percent of resolved signals) for one symbol or
/// for the whole log.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitRates {
    pub resolved: usize,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub sl: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_follows_progress() {
        assert!(SignalStatus::Pending < SignalStatus::Tp1);
        assert!(SignalStatus::Tp1 < SignalStatus::Tp2);
        assert!(SignalStatus::Tp2 < SignalStatus::Tp3);
        assert!(SignalStatus::Tp3.is_take_profit());
        assert!(!SignalStatus::Sl.is_take_profit());
        assert!(!SignalStatus::Pending.is_resolved());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("long".parse::<Direction>().unwrap(), Direction::Long);
        assert_eq!("SHORT".parse::<Direction>().unwrap(), Direction::Short);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!("Swing".parse::<TradeType>().unwrap(), TradeType::Swing);
        assert_eq!("tp2".parse::<SignalStatus>().unwrap(), SignalStatus::Tp2);
    }

    #[test]
    fn test_trade_type_from_confidence() {
        assert_eq!(TradeType::from_confidence(90.0), TradeType::Swing);
        assert_eq!(TradeType::from_confidence(75.0), TradeType::Swing);
        assert_eq!(TradeType::from_confidence(65.0), TradeType::Normal);
        assert_eq!(TradeType::from_confidence(40.0), TradeType::Scalping);
    }
}
