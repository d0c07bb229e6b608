use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::info;

use super::{reply_html, Command};
use crate::state::{AppState, HandlerResult};

pub async fn handle_start(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    info!("Processing /start in chat {}", msg.chat.id);
    let config = &state.config;
    let text = format!(
        "👋 <b>Welcome to {}</b>\n\n\
        I scan <b>{}</b> on <code>{}</code> and post LONG/SHORT signals when at least \
        <b>{}</b> timeframes agree.\n\n\
        Every signal is tracked until TP3, SL or {}h pass.\n\n\
        Send /help for the command list.",
        config.bot_name,
        if config.symbols.is_empty() {
            "USDT pairs".to_string()
        } else {
            config.symbols.join(", ")
        },
        config.timeframes.join(", "),
        config.min_agreement,
        config.track_timeout_secs / 3600,
    );
    reply_html(&bot, &msg, text).await
}

pub async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
    reply_html(&bot, &msg, Command::descriptions().to_string()).await
}
