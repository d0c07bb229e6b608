use std::sync::Arc;

use askama::Template;
use teloxide::prelude::*;

use super::reply_html;
use crate::services::backtest::run_backtest;
use crate::services::market_data::normalize_symbol;
use crate::state::{AppState, HandlerResult};

const TIMEFRAMES: [&str; 12] = ["1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d"];
const DEFAULT_TIMEFRAME: &str = "1h";

/// `SYMBOL [TIMEFRAME]`
pub fn parse_backtest_args(args: &str) -> Result<(String, String), String> {
    let mut parts = args.split_whitespace();
    let symbol = parts
        .next()
        .ok_or_else(|| "Usage: <code>/backtest SYMBOL [TIMEFRAME]</code>, e.g. <code>/backtest BTCUSDT 4h</code>".to_string())?;
    let timeframe = parts.next().unwrap_or(DEFAULT_TIMEFRAME).to_lowercase();
    if !TIMEFRAMES.contains(&timeframe.as_str()) {
        return Err(format!(
            "Unsupported timeframe <code>{}</code>. Use one of: {}",
            shared::templates::escape_html(&timeframe),
            TIMEFRAMES.join(", ")
        ));
    }
    Ok((normalize_symbol(symbol), timeframe))
}

pub async fn handle_backtest(bot: Bot, msg: Message, state: Arc<AppState>, args: String) -> HandlerResult {
    let (symbol, timeframe) = match parse_backtest_args(&args) {
        Ok(parsed) => parsed,
        Err(usage) => return reply_html(&bot, &msg, format!("⚠️ {}", usage)).await,
    };

    reply_html(&bot, &msg, format!("🧪 Backtesting <b>{}</b> on <code>{}</code>...", symbol, timeframe)).await?;
    match run_backtest(
        state.market.as_ref(),
        &symbol,
        &timeframe,
        state.analysis.candle_limit,
        &state.analysis.scoring,
    )
    .await
    {
        Ok(report) => reply_html(&bot, &msg, report.template().render()?).await,
        Err(e) => {
            tracing::warn!("[{}] Backtest failed: {:#}", symbol, e);
            reply_html(&bot, &msg, format!("❌ Backtest failed for <b>{}</b>.", symbol)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backtest_args() {
        assert_eq!(
            parse_backtest_args("btcusdt").unwrap(),
            ("BTC/USDT".to_string(), "1h".to_string())
        );
        assert_eq!(
            parse_backtest_args(" ETH/USDT  4H ").unwrap(),
            ("ETH/USDT".to_string(), "4h".to_string())
        );
        assert!(parse_backtest_args("").is_err());
        assert!(parse_backtest_args("BTCUSDT 7h").unwrap_err().contains("7h"));
    }
}
