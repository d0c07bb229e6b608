use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use shared::SignalError;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub last_price: f64,
    pub quote_volume_24h: f64,
    pub base_volume_24h: f64,
}

impl Ticker {
    /// 24h volume in the quote currency. Some markets report zero quote
    /// volume, in which case it is derived from base volume and last price.
    pub fn effective_quote_volume(&self) -> f64 {
        if self.quote_volume_24h > 0.0 {
            self.quote_volume_24h
        } else if self.base_volume_24h > 0.0 && self.last_price > 0.0 {
            self.base_volume_24h * self.last_price
        } else {
            0.0
        }
    }
}

/// Source of candles, tickers and live prices.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;
    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker>;
    async fn fetch_price(&self, symbol: &str) -> Result<f64>;
    /// Every actively trading `BASE/USDT` pair.
    async fn list_usdt_symbols(&self) -> Result<Vec<String>>;
}

/// Rejects series the indicator pipeline cannot trust.
pub fn validate_candles(candles: &[Candle]) -> Result<(), SignalError> {
    for (i, c) in candles.iter().enumerate() {
        let prices = [c.open, c.high, c.low, c.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(SignalError::InvalidData(format!("candle {} has a non-positive price", i)));
        }
        if !c.volume.is_finite() || c.volume < 0.0 {
            return Err(SignalError::InvalidData(format!("candle {} has a negative volume", i)));
        }
        if c.low > c.high {
            return Err(SignalError::InvalidData(format!("candle {} has low above high", i)));
        }
    }
    Ok(())
}

/// `btcusdt`, `BTCUSDT` and `btc/usdt` all become `BTC/USDT`.
pub fn normalize_symbol(input: &str) -> String {
    let upper = input.trim().to_uppercase();
    if upper.contains('/') {
        return upper;
    }
    for quote in ["USDT", "USDC", "BUSD", "BTC", "ETH"] {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}/{}", base, quote);
            }
        }
    }
    upper
}

/// Exchange wire form of a `BASE/QUOTE` symbol.
pub fn exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "").to_uppercase()
}

pub struct BinanceClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24hResponse {
    last_price: String,
    volume: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeSymbol {
    status: String,
    base_asset: String,
    quote_asset: String,
}

impl BinanceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let base_url = Url::parse(base_url).with_context(|| format!("invalid exchange url {}", base_url))?;
        Ok(Self { http, base_url })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let mut url = self.base_url.join(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            anyhow::bail!("{} {}: {}", path, status, res.text().await.unwrap_or_default());
        }
        Ok(res)
    }
}

fn parse_f64(raw: &str, field: &str) -> Result<f64> {
    raw.parse::<f64>().with_context(|| format!("bad {} value '{}'", field, raw))
}

/// One kline row: `[openTime, "open", "high", "low", "close", "volume", ...]`.
fn parse_kline_row(row: &serde_json::Value) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 6 {
        return None;
    }
    let field = |i: usize| -> Option<f64> { arr[i].as_str()?.parse().ok() };
    Some(Candle {
        timestamp: Utc.timestamp_millis_opt(arr[0].as_i64()?).single()?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let res = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", exchange_symbol(symbol)),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let raw: Vec<serde_json::Value> = res.json().await?;
        let candles: Vec<Candle> = raw.iter().filter_map(parse_kline_row).collect();
        if candles.len() != raw.len() {
            tracing::warn!("[{}] dropped {} malformed {} klines", symbol, raw.len() - candles.len(), timeframe);
        }
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        let res = self
            .get("/api/v3/ticker/24hr", &[("symbol", exchange_symbol(symbol))])
            .await?;
        let body: Ticker24hResponse = res.json().await?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last_price: parse_f64(&body.last_price, "lastPrice")?,
            quote_volume_24h: parse_f64(&body.quote_volume, "quoteVolume")?,
            base_volume_24h: parse_f64(&body.volume, "volume")?,
        })
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let res = self
            .get("/api/v3/ticker/price", &[("symbol", exchange_symbol(symbol))])
            .await?;
        let body: PriceResponse = res.json().await?;
        parse_f64(&body.price, "price")
    }

    async fn list_usdt_symbols(&self) -> Result<Vec<String>> {
        let res = self.get("/api/v3/exchangeInfo", &[]).await?;
        let body: ExchangeInfoResponse = res.json().await?;
        let symbols: Vec<String> = body
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.quote_asset == "USDT")
            .map(|s| format!("{}/{}", s.base_asset, s.quote_asset))
            .collect();
        tracing::info!("Found {} USDT pairs", symbols.len());
        Ok(symbols)
    }
}

type CandleKey = (String, String, usize);

/// Wraps a source with a short-lived candle cache. Tickers and prices are
/// always fetched live.
pub struct CachedMarketData<S> {
    inner: S,
    ttl: Duration,
    candles: Mutex<HashMap<CandleKey, (Instant, Vec<Candle>)>>,
}

impl<S: MarketDataSource> CachedMarketData<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            candles: Mutex::new(HashMap::new()),
        }
    }

    /// Drops expired entries.
    pub async fn evict_expired(&self) {
        let ttl = self.ttl;
        self.candles
            .lock()
            .await
            .retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    }
}

#[async_trait]
impl<S: MarketDataSource> MarketDataSource for CachedMarketData<S> {
    async fn fetch_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        let key = (symbol.to_string(), timeframe.to_string(), limit);
        if let Some((stored_at, candles)) = self.candles.lock().await.get(&key) {
            if stored_at.elapsed() < self.ttl {
                tracing::debug!("[{}] {} candles served from cache", symbol, timeframe);
                return Ok(candles.clone());
            }
        }

        let candles = self.inner.fetch_candles(symbol, timeframe, limit).await?;
        self.candles
            .lock()
            .await
            .insert(key, (Instant::now(), candles.clone()));
        Ok(candles)
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.inner.fetch_ticker(symbol).await
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        self.inner.fetch_price(symbol).await
    }

    async fn list_usdt_symbols(&self) -> Result<Vec<String>> {
        self.inner.list_usdt_symbols().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{candle, FakeMarketData};
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = json!([1_700_000_000_000i64, "1.5", "2.0", "1.0", "1.8", "1234.5", 1_700_000_059_999i64, "0"]);
        let c = parse_kline_row(&row).unwrap();
        assert_eq!(c.open, 1.5);
        assert_eq!(c.high, 2.0);
        assert_eq!(c.low, 1.0);
        assert_eq!(c.close, 1.8);
        assert_eq!(c.volume, 1234.5);
        assert_eq!(c.timestamp.timestamp_millis(), 1_700_000_000_000);

        assert!(parse_kline_row(&json!([1, "1.0"])).is_none());
        assert!(parse_kline_row(&json!([1, "x", "1", "1", "1", "1"])).is_none());
    }

    #[test]
    fn test_symbol_forms() {
        assert_eq!(normalize_symbol("btcusdt"), "BTC/USDT");
        assert_eq!(normalize_symbol("eth/usdt"), "ETH/USDT");
        assert_eq!(normalize_symbol(" SOLUSDC "), "SOL/USDC");
        assert_eq!(exchange_symbol("BTC/USDT"), "BTCUSDT");
    }

    #[test]
    fn test_quote_volume_fallback() {
        let mut ticker = Ticker {
            symbol: "ABC/USDT".to_string(),
            last_price: 2.0,
            quote_volume_24h: 0.0,
            base_volume_24h: 1_000.0,
        };
        assert_eq!(ticker.effective_quote_volume(), 2_000.0);
        ticker.quote_volume_24h = 5_000.0;
        assert_eq!(ticker.effective_quote_volume(), 5_000.0);
    }

    #[test]
    fn test_validate_candles() {
        let mut candles = vec![candle(0, 10.0, 11.0, 9.0, 10.5, 100.0)];
        assert!(validate_candles(&candles).is_ok());

        candles.push(candle(1, 10.0, 9.0, 11.0, 10.0, 100.0));
        assert!(matches!(validate_candles(&candles), Err(SignalError::InvalidData(_))));

        let bad_price = vec![candle(0, 0.0, 1.0, 0.5, 0.8, 1.0)];
        assert!(validate_candles(&bad_price).is_err());

        let bad_volume = vec![candle(0, 1.0, 1.0, 1.0, 1.0, -1.0)];
        assert!(validate_candles(&bad_volume).is_err());
    }

    #[tokio::test]
    async fn test_cache_serves_repeat_requests() {
        let fake = FakeMarketData::new();
        fake.set_candles("BTC/USDT", "1h", vec![candle(0, 1.0, 1.0, 1.0, 1.0, 1.0)]);
        let cached = CachedMarketData::new(fake, Duration::from_secs(600));

        cached.fetch_candles("BTC/USDT", "1h", 100).await.unwrap();
        cached.fetch_candles("BTC/USDT", "1h", 100).await.unwrap();
        assert_eq!(cached.inner.candle_calls(), 1);

        // A different limit is a different key.
        cached.fetch_candles("BTC/USDT", "1h", 50).await.unwrap();
        assert_eq!(cached.inner.candle_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let fake = FakeMarketData::new();
        fake.set_candles("BTC/USDT", "1h", vec![candle(0, 1.0, 1.0, 1.0, 1.0, 1.0)]);
        let cached = CachedMarketData::new(fake, Duration::from_millis(0));

        cached.fetch_candles("BTC/USDT", "1h", 100).await.unwrap();
        cached.fetch_candles("BTC/USDT", "1h", 100).await.unwrap();
        assert_eq!(cached.inner.candle_calls(), 2);

        cached.evict_expired().await;
        assert!(cached.candles.lock().await.is_empty());
    }
}
