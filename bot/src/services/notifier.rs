use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use askama::Template;
use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use shared::templates::SignalMessageTemplate;
use shared::Signal;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::RequestError;
use thiserror::Error;

use super::cooldown::CooldownStore;
use super::tracker::Tracker;
use crate::repositories::SignalRepository;

#[derive(Debug, Error)]
pub enum SendError {
    /// Transport failure, worth retrying.
    #[error("network error: {0}")]
    Network(String),
    /// Rejected by Telegram.
    #[error("telegram error: {0}")]
    Api(String),
}

/// Destination for HTML messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_html(&self, text: &str) -> Result<(), SendError>;
}

/// Sends to a fixed Telegram chat.
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send_html(&self, text: &str) -> Result<(), SendError> {
        match self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => Ok(()),
            Err(e @ (RequestError::Network(_) | RequestError::Io(_))) => Err(SendError::Network(e.to_string())),
            Err(e) => Err(SendError::Api(e.to_string())),
        }
    }
}

/// Sends `text`, retrying network failures up to `retries` attempts in total.
pub async fn send_with_retry(
    sink: &dyn MessageSink,
    text: &str,
    retries: u32,
    delay: Duration,
) -> Result<(), SendError> {
    let attempts = retries.max(1);
    let mut attempt = 1;
    loop {
        match sink.send_html(text).await {
            Ok(()) => return Ok(()),
            Err(SendError::Network(e)) if attempt < attempts => {
                tracing::warn!("Send attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct Notifier {
    sink: Arc<dyn MessageSink>,
    repo: Arc<SignalRepository>,
    tracker: Arc<Tracker>,
    timezone: Tz,
    bot_name: String,
    retries: u32,
    retry_delay: Duration,
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn MessageSink>,
        repo: Arc<SignalRepository>,
        tracker: Arc<Tracker>,
        timezone: Tz,
        bot_name: String,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            sink,
            repo,
            tracker,
            timezone,
            bot_name,
            retries,
            retry_delay,
        }
    }

    pub fn render(&self, signal: &Signal) -> Result<String> {
        Ok(SignalMessageTemplate::new(signal, self.timezone, &self.bot_name).render()?)
    }

    /// Plain message to the channel (startup notice, reports).
    pub async fn send_text(&self, text: &str) -> Result<()> {
        send_with_retry(self.sink.as_ref(), text, self.retries, self.retry_delay).await?;
        Ok(())
    }

    /// Delivers a signal, then stores it, starts its cooldown and its
    /// outcome tracking. Returns the stored signal. A failed write still
    /// leaves the symbol cooling down.
    pub async fn dispatch(&self, signal: Signal, cooldowns: &mut CooldownStore) -> Result<Signal> {
        let text = self.render(&signal)?;
        if let Err(e) = send_with_retry(self.sink.as_ref(), &text, self.retries, self.retry_delay).await {
            tracing::error!("[{}] Signal dropped, delivery failed: {}", signal.symbol, e);
            return Err(e.into());
        }
        tracing::info!(
            "[{}] {} signal sent ({}, confidence {:.2})",
            signal.symbol,
            signal.direction,
            signal.timeframe,
            signal.confidence
        );

        // The alert is out either way, so the symbol cools down even when
        // the row cannot be written.
        let stored = self.repo.insert(&signal).await;
        cooldowns.record(&signal.symbol, Utc::now());
        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!("[{}] Signal sent but not stored, not tracked: {:#}", signal.symbol, e);
                return Err(e);
            }
        };
        self.tracker.track(stored.clone()).await;
        Ok(stored)
    }
}
