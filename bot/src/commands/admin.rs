use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use shared::templates::format_local_time;
use teloxide::prelude::*;

use super::reply_html;
use crate::state::{AppState, HandlerResult};

fn build_time() -> String {
    let raw = option_env!("BUILD_TIME").unwrap_or("unknown");
    raw.parse::<i64>()
        .ok()
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// `3d 4h 12m` style uptime.
pub fn format_uptime(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total = (now - since).num_minutes().max(0);
    let (days, hours, minutes) = (total / 1440, total % 1440 / 60, total % 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

pub async fn handle_version(bot: Bot, msg: Message) -> HandlerResult {
    tracing::info!("Handling /version in chat {}", msg.chat.id);
    let version_info = format!(
        "✅ 🤖 <b>Bot Version</b> <code>{}</code>\n\
        <b>Branch:</b> <code>{}</code>\n\
        <b>Tag:</b> <code>{}</code>\n\
        <b>Commit:</b> <code>{}</code>\n\
        <b>Build Time:</b> <code>{}</code>\n\
        <b>OS:</b> <code>{}</code>",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_BRANCH").unwrap_or("unknown"),
        option_env!("GIT_TAG").unwrap_or("unknown"),
        option_env!("GIT_HASH").unwrap_or("unknown"),
        build_time(),
        option_env!("TARGET_OS").unwrap_or("unknown"),
    );
    reply_html(&bot, &msg, version_info).await
}

pub async fn handle_status(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let stats = state.stats.read().await.clone();
    let tz = state.config.timezone;
    let at = |t: Option<DateTime<Utc>>| t.map(|t| format_local_time(t, tz)).unwrap_or_else(|| "never".to_string());
    let stored = state.repo.count().await?;
    let scoring = &state.analysis.scoring;

    let text = format!(
        "📡 <b>Status</b>\n\n\
        <b>Scanner:</b> {}\n\
        <b>Uptime:</b> {}\n\
        <b>Cycles:</b> {}\n\
        <b>Symbols last cycle:</b> {}\n\
        <b>Last cycle:</b> {}\n\
        <b>Signals sent:</b> {}\n\
        <b>Last signal:</b> {}\n\
        <b>Tracking:</b> {} signal(s)\n\
        <b>Stored signals:</b> {}\n\
        <b>Timeframes:</b> <code>{}</code>\n\
        <b>Scoring:</b> <code>{} v{}</code>",
        if stats.running { "🟢 running" } else { "🔴 stopped" },
        format_uptime(state.started_at, Utc::now()),
        stats.cycles,
        stats.symbols_last_cycle,
        at(stats.last_cycle_at),
        stats.signals_sent,
        at(stats.last_signal_at),
        state.tracker.active().await,
        stored,
        state.analysis.timeframes.join(", "),
        scoring.name,
        scoring.version,
    );
    reply_html(&bot, &msg, text).await
}

/// Checks channel delivery end to end.
pub async fn handle_test(bot: Bot, msg: Message, state: Arc<AppState>) -> HandlerResult {
    let now = format_local_time(Utc::now(), state.config.timezone);
    match state
        .notifier
        .send_text(&format!("🧪 <b>Test message</b> from {}\n⏰ {}", state.config.bot_name, now))
        .await
    {
        Ok(()) => reply_html(&bot, &msg, "✅ Test message delivered to the channel.").await,
        Err(e) => {
            tracing::error!("Test message failed: {:#}", e);
            reply_html(&bot, &msg, "❌ Could not reach the channel, check TELEGRAM_CHAT_ID.").await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_format_uptime() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_uptime(t0, t0 + Duration::minutes(5)), "5m");
        assert_eq!(format_uptime(t0, t0 + Duration::minutes(125)), "2h 5m");
        assert_eq!(format_uptime(t0, t0 + Duration::hours(76)), "3d 4h 0m");
        assert_eq!(format_uptime(t0, t0 - Duration::hours(1)), "0m");
    }
}
