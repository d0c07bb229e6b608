//! In-memory market data and candle builders for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use super::market_data::{Candle, MarketDataSource, Ticker};

pub fn candle(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Candles whose closes follow `closes`, each opening at the previous close
/// with a small wick on both sides.
pub fn series_from_closes(closes: &[f64], volume: f64) -> Vec<Candle> {
    let mut prev = closes.first().copied().unwrap_or(1.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            let wick = close.abs() * 0.001;
            candle(i as i64, open, open.max(close) + wick, open.min(close) - wick, close, volume)
        })
        .collect()
}

pub fn flat_series(n: usize, price: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| candle(i as i64, price, price, price, price, 100.0))
        .collect()
}

/// Forty flat candles at 100, forty one-point red candles down to 60, then a
/// high-volume bullish engulfing candle closing at 61.2. Scores LONG on
/// oversold RSI, the engulfing reversal and high volume.
pub fn oversold_reversal_series() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0, 100.05, 99.95, 100.0, 100.0)).collect();
    let mut close = 100.0;
    for i in 40..80 {
        let open = close;
        close -= 1.0;
        candles.push(candle(i, open, open + 0.05, close - 0.05, close, 100.0));
    }
    candles.push(candle(80, close, close + 1.3, close - 0.1, close + 1.2, 500.0));
    candles
}

#[derive(Default)]
pub struct FakeMarketData {
    candles: Mutex<HashMap<(String, String), Vec<Candle>>>,
    tickers: Mutex<HashMap<String, Ticker>>,
    prices: Mutex<HashMap<String, VecDeque<f64>>>,
    symbols: Mutex<Vec<String>>,
    candle_calls: AtomicUsize,
}

impl FakeMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_candles(&self, symbol: &str, timeframe: &str, candles: Vec<Candle>) {
        self.candles
            .lock()
            .unwrap()
            .insert((symbol.to_string(), timeframe.to_string()), candles);
    }

    pub fn set_quote_volume(&self, symbol: &str, quote_volume: f64) {
        self.tickers.lock().unwrap().insert(
            symbol.to_string(),
            Ticker {
                symbol: symbol.to_string(),
                last_price: 1.0,
                quote_volume_24h: quote_volume,
                base_volume_24h: quote_volume,
            },
        );
    }

    /// Successive `fetch_price` calls walk through `prices`; the last one
    /// repeats forever.
    pub fn set_prices(&self, symbol: &str, prices: &[f64]) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), prices.iter().copied().collect());
    }

    pub fn set_symbols(&self, symbols: &[&str]) {
        *self.symbols.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }

    pub fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for FakeMarketData {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        let candles = self
            .candles
            .lock()
            .unwrap()
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no candles for {} {}", symbol, timeframe))?;
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.tickers
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no ticker for {}", symbol))
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let mut prices = self.prices.lock().unwrap();
        let queue = prices
            .get_mut(symbol)
            .ok_or_else(|| anyhow::anyhow!("no price for {}", symbol))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue.front().copied().ok_or_else(|| anyhow::anyhow!("no price for {}", symbol))
        }
    }

    async fn list_usdt_symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.lock().unwrap().clone())
    }
}
