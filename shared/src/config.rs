use std::str::FromStr;

use anyhow::Context;
use dotenv::dotenv;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bot_token: String,
    pub bot_name: String,
    pub chat_id: i64,
    pub exchange_base_url: String,

    // Scanning
    pub symbols: Vec<String>,
    pub max_symbols: usize,
    pub timeframes: Vec<String>,
    pub candle_limit: usize,
    pub cache_ttl_secs: u64,
    pub min_quote_volume: f64,
    pub min_agreement: usize,
    /// A timeframe counts only if its last volume reaches this multiple of
    /// the 20-candle average. `0` disables the check.
    pub timeframe_volume_ratio: f64,
    pub scoring: ScoringConfig,

    // Cooldown
    pub cooldown_hours: i64,
    pub cooldown_file: String,

    // Batching
    pub batch_size: usize,
    pub batch_delay_secs: u64,
    pub cycle_interval_secs: u64,
    pub max_signals_per_batch: usize,
    pub min_signal_interval_secs: u64,

    // Delivery and tracking
    pub send_retries: u32,
    pub send_retry_delay_secs: u64,
    pub track_poll_secs: u64,
    pub track_timeout_secs: u64,

    // Runtime surface
    pub timezone: chrono_tz::Tz,
    pub health_port: u16,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub daily_report_hour: Option<u32>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenv().ok();

        let bot_token = std::env::var("BOT_TOKEN")
            .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
            .context("BOT_TOKEN (or TELEGRAM_BOT_TOKEN) must be set")?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .context("TELEGRAM_CHAT_ID must be set")?
            .trim()
            .parse::<i64>()
            .context("TELEGRAM_CHAT_ID must be a numeric chat id")?;

        let timezone_name = env_or("TIMEZONE", "Asia/Karachi");
        let timezone = timezone_name.parse::<chrono_tz::Tz>().unwrap_or_else(|_| {
            warn!("⚠️ Unknown TIMEZONE '{}', using Asia/Karachi", timezone_name);
            chrono_tz::Asia::Karachi
        });

        let profile = env_or("SCORING_PROFILE", "standard");
        let scoring = ScoringConfig::profile(&profile).unwrap_or_else(|| {
            warn!("⚠️ Unknown SCORING_PROFILE '{}', using standard", profile);
            ScoringConfig::standard()
        });

        Ok(Config {
            database_url: env_or("DATABASE_URL", "sqlite://signals.db?mode=rwc"),
            bot_token,
            bot_name: env_or("BOT_NAME", "SignalBot"),
            chat_id,
            exchange_base_url: env_or("EXCHANGE_BASE_URL", "https://api.binance.com"),

            symbols: env_list("SYMBOLS", &[]),
            max_symbols: env_parse("MAX_SYMBOLS", 200),
            timeframes: env_list("TIMEFRAMES", &["15m", "1h", "4h", "1d"]),
            candle_limit: env_parse("CANDLE_LIMIT", 100),
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", 600),
            min_quote_volume: env_parse("MIN_QUOTE_VOLUME", 1_000_000.0),
            min_agreement: env_parse("MIN_AGREEMENT", 2),
            timeframe_volume_ratio: env_parse("TIMEFRAME_VOLUME_RATIO", 1.2),
            scoring,

            cooldown_hours: env_parse("COOLDOWN_HOURS", 4),
            cooldown_file: env_or("COOLDOWN_FILE", "cooldowns.json"),

            batch_size: env_parse("BATCH_SIZE", 20),
            batch_delay_secs: env_parse("BATCH_DELAY_SECS", 60),
            cycle_interval_secs: env_parse("CYCLE_INTERVAL_SECS", 300),
            max_signals_per_batch: env_parse("MAX_SIGNALS_PER_BATCH", 1),
            min_signal_interval_secs: env_parse("MIN_SIGNAL_INTERVAL_SECS", 60),

            send_retries: env_parse("SEND_RETRIES", 3),
            send_retry_delay_secs: env_parse("SEND_RETRY_DELAY_SECS", 5),
            track_poll_secs: env_parse("TRACK_POLL_SECS", 15),
            track_timeout_secs: env_parse("TRACK_TIMEOUT_SECS", 3 * 60 * 60),

            timezone,
            health_port: env_parse("HEALTH_PORT", 8000),
            webhook_url: std::env::var("WEBHOOK_URL").ok().filter(|s| !s.trim().is_empty()),
            webhook_port: env_parse("WEBHOOK_PORT", 8443),
            daily_report_hour: std::env::var("DAILY_REPORT_HOUR")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|h| *h < 24),
        })
    }
}

/// Settings of the read-only HTTP API. Needs no Telegram credentials.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub database_url: String,
    pub port: u16,
    pub max_page_size: u64,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        dotenv().ok();
        ApiConfig {
            database_url: env_or("DATABASE_URL", "sqlite://signals.db?mode=rwc"),
            port: env_parse("API_PORT", 9999),
            max_page_size: env_parse("API_MAX_PAGE_SIZE", 500),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `key`, falling back to `default` (with a warning) when the value
/// is present but unparseable.
fn env_parse<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("⚠️ Invalid value '{}' for {}, using default {}", raw, key, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => parse_list(&raw),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Threshold profile used by the signal scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    pub name: &'static str,
    pub version: u32,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub adx_strong_trend: f64,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    /// Relative distance to support/resistance counted as "near".
    pub near_level_pct: f64,
    /// Last volume above `volume_sma_20 * high_volume_ratio` is "high".
    pub high_volume_ratio: f64,

    pub base_confidence: f64,
    pub weight_macd: f64,
    pub weight_pattern: f64,
    pub weight_trend: f64,
    pub weight_level: f64,
    pub weight_volume: f64,
    pub max_confidence: f64,

    pub min_conditions: usize,
    pub min_confidence: f64,

    pub atr_floor_pct: f64,
    pub tp_pct: [f64; 3],
    pub tp_atr_mult: [f64; 3],
    pub sl_pct: f64,
    pub stablecoin_tp_cap: [f64; 3],

    pub min_history_for_hit_rates: usize,
}

impl ScoringConfig {
    pub fn standard() -> Self {
        ScoringConfig {
            name: "standard",
            version: 1,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            adx_strong_trend: 25.0,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            near_level_pct: 0.02,
            high_volume_ratio: 1.2,

            base_confidence: 50.0,
            weight_macd: 15.0,
            weight_pattern: 12.0,
            weight_trend: 12.0,
            weight_level: 8.0,
            weight_volume: 8.0,
            max_confidence: 95.0,

            min_conditions: 2,
            min_confidence: 70.0,

            atr_floor_pct: 0.002,
            tp_pct: [0.01, 0.015, 0.02],
            tp_atr_mult: [0.75, 1.5, 2.5],
            sl_pct: 0.01,
            stablecoin_tp_cap: [0.01, 0.015, 0.02],

            min_history_for_hit_rates: 5,
        }
    }

    pub fn conservative() -> Self {
        ScoringConfig {
            name: "conservative",
            min_conditions: 3,
            min_confidence: 75.0,
            ..Self::standard()
        }
    }

    pub fn aggressive() -> Self {
        ScoringConfig {
            name: "aggressive",
            rsi_oversold: 35.0,
            rsi_overbought: 65.0,
            adx_strong_trend: 20.0,
            min_confidence: 65.0,
            ..Self::standard()
        }
    }

    pub fn profile(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "standard" => Some(Self::standard()),
            "conservative" => Some(Self::conservative()),
            "aggressive" => Some(Self::aggressive()),
            _ => None,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_trims_and_skips_empty() {
        assert_eq!(
            parse_list(" BTC/USDT, ETH/USDT ,,SOL/USDT"),
            vec!["BTC/USDT", "ETH/USDT", "SOL/USDT"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_profiles() {
        let standard = ScoringConfig::profile("Standard").unwrap();
        assert_eq!(standard.min_confidence, 70.0);
        assert_eq!(standard.min_conditions, 2);

        let conservative = ScoringConfig::profile("conservative").unwrap();
        assert_eq!(conservative.min_conditions, 3);
        assert_eq!(conservative.rsi_oversold, 30.0);

        let aggressive = ScoringConfig::profile("aggressive").unwrap();
        assert_eq!(aggressive.rsi_oversold, 35.0);
        assert_eq!(aggressive.adx_strong_trend, 20.0);

        assert!(ScoringConfig::profile("yolo").is_none());
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("SIGNAL_BOT_TEST_BATCH", "not-a-number");
        assert_eq!(env_parse::<usize>("SIGNAL_BOT_TEST_BATCH", 20), 20);
        std::env::set_var("SIGNAL_BOT_TEST_BATCH", " 7 ");
        assert_eq!(env_parse::<usize>("SIGNAL_BOT_TEST_BATCH", 20), 7);
        std::env::remove_var("SIGNAL_BOT_TEST_BATCH");
    }
}
