use std::sync::Arc;

use teloxide::prelude::*;

use super::reply_html;
use crate::services::aggregator::analyze_symbol;
use crate::services::market_data::normalize_symbol;
use crate::state::{AppState, HandlerResult};

/// `/signal SYMBOL` runs a live analysis without dispatching it;
/// a bare `/signal` shows the latest stored signal.
pub async fn handle_signal(bot: Bot, msg: Message, state: Arc<AppState>, symbol: String) -> HandlerResult {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        let latest = state.repo.list_recent(1).await?;
        return match latest.first() {
            Some(signal) => reply_html(&bot, &msg, state.notifier.render(signal)?).await,
            None => reply_html(&bot, &msg, "📭 No signal has been sent yet.").await,
        };
    }

    let symbol = normalize_symbol(symbol);
    tracing::info!("[{}] On-demand analysis from chat {}", symbol, msg.chat.id);
    reply_html(&bot, &msg, format!("🔍 Analysing <b>{}</b>...", symbol)).await?;

    let history = match state.repo.hit_rates_for(&symbol).await {
        Ok(rates) => Some(rates),
        Err(e) => {
            tracing::warn!("[{}] Hit rates unavailable: {:#}", symbol, e);
            None
        }
    };
    match analyze_symbol(state.market.as_ref(), &symbol, &state.analysis, history.as_ref()).await {
        Ok(signal) => reply_html(&bot, &msg, state.notifier.render(&signal)?).await,
        Err(e) => {
            reply_html(
                &bot,
                &msg,
                format!("⚪ <b>No signal for {}</b>\n\n{}", symbol, shared::templates::escape_html(&e.to_string())),
            )
            .await
        }
    }
}
