use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

use crate::state::{AppState, HandlerResult};

pub mod admin;
pub mod backtest;
pub mod report;
pub mod signal;
pub mod start;

pub use admin::{handle_status, handle_test, handle_version};
pub use backtest::handle_backtest;
pub use report::{handle_report, handle_summary};
pub use signal::handle_signal;
pub use start::{handle_help, handle_start};

/// 📈 <b>Signal Bot</b> commands
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    /// 🚀 Start the bot
    Start,
    /// ✨ Show this help
    Help,
    /// 📡 Scanner and tracker status
    Status,
    /// 🔍 Analyse a symbol now (/signal BTCUSDT), or show the latest signal
    Signal(String),
    /// 📅 Yesterday's and today's signals
    Summary,
    /// 📊 All-time performance report
    Report,
    /// 🧪 Send a test message to the channel
    Test,
    /// ℹ️ Build information
    Version,
    /// 🧪 Replay the scorer on history (/backtest BTCUSDT 1h)
    Backtest(String),
}

/// Replies with Telegram HTML.
pub(crate) async fn reply_html(bot: &Bot, msg: &Message, text: impl Into<String>) -> HandlerResult {
    bot.send_message(msg.chat.id, text.into())
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Unknown `/command`.
pub async fn handle_invalid(bot: Bot, msg: Message, _state: Arc<AppState>) -> HandlerResult {
    reply_html(&bot, &msg, "❓ Unknown command. Send /help to see what I can do.").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/status", "signalbot").unwrap(), Command::Status);
        assert_eq!(
            Command::parse("/signal BTCUSDT", "signalbot").unwrap(),
            Command::Signal("BTCUSDT".to_string())
        );
        assert_eq!(
            Command::parse("/backtest ETHUSDT 4h", "signalbot").unwrap(),
            Command::Backtest("ETHUSDT 4h".to_string())
        );
        assert!(Command::parse("/nope", "signalbot").is_err());
    }

    #[test]
    fn test_descriptions_list_every_command() {
        let help = Command::descriptions().to_string();
        for name in ["/start", "/help", "/status", "/signal", "/summary", "/report", "/test", "/version", "/backtest"] {
            assert!(help.contains(name), "{} missing from help", name);
        }
    }
}
