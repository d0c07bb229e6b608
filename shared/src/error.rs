use thiserror::Error;

use crate::models::Direction;

/// Reasons a symbol does not produce a signal.
///
/// Every variant is an expected outcome of a scan, not a crash: the scanner
/// logs it and moves on to the next symbol.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SignalError {
    #[error("insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("invalid market data: {0}")]
    InvalidData(String),

    #[error("no clear direction ({bullish} bullish vs {bearish} bearish, {matched} conditions)")]
    NoDirection {
        bullish: usize,
        bearish: usize,
        matched: usize,
    },

    #[error("confidence {confidence:.2}% below threshold {min:.2}%")]
    BelowConfidenceThreshold { confidence: f64, min: f64 },

    #[error("last volume {volume:.2} below {ratio}x the 20-candle average {average:.2}")]
    ThinVolume { volume: f64, average: f64, ratio: f64 },

    #[error("fake breakout against {direction}")]
    FakeBreakout { direction: Direction },

    #[error("insufficient timeframe agreement: {count}/{total} (need {needed})")]
    NoAgreement {
        count: usize,
        total: usize,
        needed: usize,
    },

    #[error("24h quote volume ${volume:.2} below ${min:.2}")]
    VolumeRejected { volume: f64, min: f64 },

    #[error("exchange error: {0}")]
    Exchange(String),
}

impl From<anyhow::Error> for SignalError {
    fn from(err: anyhow::Error) -> Self {
        SignalError::Exchange(err.to_string())
    }
}
