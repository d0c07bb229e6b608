use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use shared::Config;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod commands;
mod health;
mod repositories;
mod services;
mod state;

use crate::commands::report::{daily_summary_text, next_report_at};
use crate::commands::{
    handle_backtest, handle_help, handle_invalid, handle_report, handle_signal, handle_start, handle_status,
    handle_summary, handle_test, handle_version, Command,
};
use crate::services::cooldown::CooldownStore;
use crate::services::scanner::{ScanContext, ScanSettings, Scanner};
use crate::state::AppState;

fn schema() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(handle_start))
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Signal(symbol)].endpoint(handle_signal))
        .branch(case![Command::Summary].endpoint(handle_summary))
        .branch(case![Command::Report].endpoint(handle_report))
        .branch(case![Command::Test].endpoint(handle_test))
        .branch(case![Command::Version].endpoint(handle_version))
        .branch(case![Command::Backtest(args)].endpoint(handle_backtest));

    Update::filter_message().branch(command_handler).branch(
        dptree::filter(|msg: Message| msg.text().map(|t| t.starts_with('/')).unwrap_or(false))
            .endpoint(handle_invalid),
    )
}

async fn daily_reports(state: Arc<AppState>, hour: u32, mut shutdown: watch::Receiver<bool>) {
    loop {
        let Some(next) = next_report_at(Utc::now(), hour) else {
            tracing::error!("DAILY_REPORT_HOUR {} is not a valid hour, daily reports disabled", hour);
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tracing::info!("Next daily report at {}", next);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => return,
        }

        match daily_summary_text(&state.repo, state.config.timezone).await {
            Ok(text) => {
                if let Err(e) = state.notifier.send_text(&text).await {
                    tracing::error!("Daily report not delivered: {:#}", e);
                }
            }
            Err(e) => tracing::error!("Daily report failed: {:#}", e),
        }
    }
}

async fn evict_cache(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(state.config.cache_ttl_secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => state.cache.evict_expired().await,
            _ = shutdown.changed() => return,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting signal bot...");

    let config = Config::from_env()?;
    let bot = Bot::new(&config.bot_token);
    let app_state = Arc::new(AppState::new(config, bot.clone()).await?);
    tracing::info!("AppState initialized");

    match app_state.resume_tracking().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Resumed tracking of {} pending signal(s)", n),
        Err(e) => tracing::error!("Could not resume tracking: {:#}", e),
    }

    let health_port = app_state.config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve_health(health_port).await {
            tracing::error!("Health server stopped: {:#}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cooldown_file = PathBuf::from(&app_state.config.cooldown_file);
    let cooldowns = CooldownStore::load(&cooldown_file, chrono::Duration::hours(app_state.config.cooldown_hours))
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Starting with empty cooldowns: {:#}", e);
            CooldownStore::new(chrono::Duration::hours(app_state.config.cooldown_hours))
        });
    tracing::info!("Loaded {} cooldown(s)", cooldowns.len());

    let scanner = Scanner::new(
        app_state.market.clone(),
        app_state.repo.clone(),
        app_state.notifier.clone(),
        app_state.analysis.clone(),
        ScanSettings::from_config(&app_state.config),
    );
    let mut ctx = ScanContext::new(cooldowns, app_state.stats.clone());
    let scanner_shutdown = shutdown_rx.clone();
    let scanner_handle = tokio::spawn(async move {
        scanner.run(&mut ctx, scanner_shutdown).await;
        if let Err(e) = ctx.cooldowns.save(&cooldown_file).await {
            tracing::warn!("Failed to persist cooldowns on shutdown: {:#}", e);
        }
    });

    tokio::spawn(evict_cache(app_state.clone(), shutdown_rx.clone()));
    if let Some(hour) = app_state.config.daily_report_hour {
        tokio::spawn(daily_reports(app_state.clone(), hour, shutdown_rx.clone()));
    }

    if let Err(e) = app_state.notifier.send_text("✅ Bot initialized successfully!").await {
        tracing::error!("Startup message not delivered: {:#}", e);
    }

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![app_state.clone()])
        .enable_ctrlc_handler()
        .build();

    match app_state.config.webhook_url.clone() {
        Some(base) => {
            let url: url::Url = format!("{}/webhook", base.trim_end_matches('/'))
                .parse()
                .with_context(|| format!("invalid WEBHOOK_URL {}", base))?;
            let addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.webhook_port));
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url.clone())).await?;
            tracing::info!("Receiving updates through webhook {}", url);
            dispatcher
                .dispatch_with_listener(listener, LoggingErrorHandler::with_custom_text("Webhook listener error"))
                .await;
        }
        None => {
            tracing::info!("Bot is running and waiting for updates...");
            dispatcher.dispatch().await;
        }
    }

    tracing::info!("Shutting down...");
    shutdown_tx.send_replace(true);
    if let Err(e) = scanner_handle.await {
        tracing::error!("Scanner task failed: {}", e);
    }
    app_state.tracker.shutdown().await;

    Ok(())
}
