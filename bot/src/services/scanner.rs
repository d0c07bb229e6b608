use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use shared::{Config, Signal, SignalError};
use tokio::sync::{watch, RwLock};

use super::aggregator::{analyze_symbol, AnalysisSettings};
use super::cooldown::CooldownStore;
use super::market_data::{normalize_symbol, MarketDataSource};
use super::notifier::Notifier;
use crate::repositories::SignalRepository;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub symbols: Vec<String>,
    pub max_symbols: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub cycle_interval: Duration,
    pub max_signals_per_batch: usize,
    pub min_signal_interval: Duration,
    pub cooldown_file: PathBuf,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            symbols: config.symbols.iter().map(|s| normalize_symbol(s)).collect(),
            max_symbols: config.max_symbols,
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_secs(config.batch_delay_secs),
            cycle_interval: Duration::from_secs(config.cycle_interval_secs),
            max_signals_per_batch: config.max_signals_per_batch,
            min_signal_interval: Duration::from_secs(config.min_signal_interval_secs),
            cooldown_file: PathBuf::from(&config.cooldown_file),
        }
    }
}

/// Counters shown by `/status`.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub cycles: u64,
    pub symbols_last_cycle: usize,
    pub signals_sent: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
    pub running: bool,
}

/// State carried from one batch and cycle to the next.
pub struct ScanContext {
    pub cooldowns: CooldownStore,
    pub scanned: HashSet<String>,
    pub last_dispatch: Option<Instant>,
    pub stats: Arc<RwLock<ScanStats>>,
}

impl ScanContext {
    pub fn new(cooldowns: CooldownStore, stats: Arc<RwLock<ScanStats>>) -> Self {
        Self {
            cooldowns,
            scanned: HashSet::new(),
            last_dispatch: None,
            stats,
        }
    }
}

/// Highest-confidence first, at most `max`.
pub fn select_best(mut candidates: Vec<Signal>, max: usize) -> Vec<Signal> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.truncate(max);
    candidates
}

pub struct Scanner {
    source: Arc<dyn MarketDataSource>,
    repo: Arc<SignalRepository>,
    notifier: Arc<Notifier>,
    analysis: AnalysisSettings,
    settings: ScanSettings,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        repo: Arc<SignalRepository>,
        notifier: Arc<Notifier>,
        analysis: AnalysisSettings,
        settings: ScanSettings,
    ) -> Self {
        Self {
            source,
            repo,
            notifier,
            analysis,
            settings,
        }
    }

    pub async fn symbols(&self) -> Result<Vec<String>> {
        if !self.settings.symbols.is_empty() {
            return Ok(self.settings.symbols.clone());
        }
        let mut symbols = self.source.list_usdt_symbols().await?;
        symbols.truncate(self.settings.max_symbols);
        Ok(symbols)
    }

    /// Scans until `shutdown` flips. Errors are logged and the loop goes on.
    pub async fn run(&self, ctx: &mut ScanContext, mut shutdown: watch::Receiver<bool>) {
        ctx.stats.write().await.running = true;
        loop {
            if let Err(e) = self.run_cycle(ctx, &mut shutdown).await {
                tracing::error!("Scan cycle failed: {:#}", e);
            }
            if *shutdown.borrow() {
                break;
            }
            tracing::info!("Next cycle in {}s", self.settings.cycle_interval.as_secs());
            if wait_or_shutdown(self.settings.cycle_interval, &mut shutdown).await {
                break;
            }
        }
        ctx.stats.write().await.running = false;
        tracing::info!("Scanner stopped");
    }

    pub async fn run_cycle(&self, ctx: &mut ScanContext, shutdown: &mut watch::Receiver<bool>) -> Result<usize> {
        let pruned = ctx.cooldowns.prune(Utc::now());
        if pruned > 0 {
            tracing::debug!("Pruned {} expired cooldowns", pruned);
        }
        ctx.scanned.clear();

        let symbols = self.symbols().await?;
        tracing::info!("Scanning {} symbols", symbols.len());

        let mut sent = 0;
        let batches: Vec<&[String]> = symbols.chunks(self.settings.batch_size).collect();
        for (i, batch) in batches.iter().enumerate() {
            sent += self.scan_batch(ctx, batch, shutdown).await;
            if i + 1 < batches.len() && wait_or_shutdown(self.settings.batch_delay, shutdown).await {
                break;
            }
        }

        if let Err(e) = ctx.cooldowns.save(&self.settings.cooldown_file).await {
            tracing::warn!("Failed to persist cooldowns: {:#}", e);
        }

        let mut stats = ctx.stats.write().await;
        stats.cycles += 1;
        stats.symbols_last_cycle = ctx.scanned.len();
        stats.last_cycle_at = Some(Utc::now());
        tracing::info!("Cycle done: {} symbols, {} signals", ctx.scanned.len(), sent);
        Ok(sent)
    }

    /// Analyses a batch concurrently and dispatches the best signals.
    /// Returns how many were delivered. Signals still waiting on the
    /// dispatch spacing are dropped once shutdown is requested.
    pub async fn scan_batch(
        &self,
        ctx: &mut ScanContext,
        batch: &[String],
        shutdown: &mut watch::Receiver<bool>,
    ) -> usize {
        let now = Utc::now();
        let eligible: Vec<&String> = batch
            .iter()
            .filter(|symbol| {
                let cooling = ctx.cooldowns.is_active(symbol, now);
                if cooling {
                    tracing::debug!("[{}] In cooldown, skipped", symbol);
                }
                !cooling
            })
            .collect();

        let results = join_all(eligible.iter().map(|symbol| self.analyze(symbol))).await;

        let mut candidates = Vec::new();
        for (symbol, result) in eligible.iter().zip(results) {
            ctx.scanned.insert(symbol.to_string());
            match result {
                Ok(signal) => candidates.push(signal),
                Err(e) => tracing::debug!("[{}] No signal: {}", symbol, e),
            }
        }

        let mut sent = 0;
        for signal in select_best(candidates, self.settings.max_signals_per_batch) {
            if let Some(last) = ctx.last_dispatch {
                let elapsed = last.elapsed();
                if elapsed < self.settings.min_signal_interval
                    && wait_or_shutdown(self.settings.min_signal_interval - elapsed, shutdown).await
                {
                    tracing::info!("Shutting down, {} undelivered", signal.symbol);
                    break;
                }
            }
            let symbol = signal.symbol.clone();
            match self.notifier.dispatch(signal, &mut ctx.cooldowns).await {
                Ok(_) => {
                    sent += 1;
                    ctx.last_dispatch = Some(Instant::now());
                    let mut stats = ctx.stats.write().await;
                    stats.signals_sent += 1;
                    stats.last_signal_at = Some(Utc::now());
                }
                Err(e) => tracing::error!("[{}] Dispatch failed: {:#}", symbol, e),
            }
        }
        sent
    }

    async fn analyze(&self, symbol: &str) -> Result<Signal, SignalError> {
        let history = match self.repo.hit_rates_for(symbol).await {
            Ok(rates) => Some(rates),
            Err(e) => {
                tracing::warn!("[{}] Hit rates unavailable: {:#}", symbol, e);
                None
            }
        };
        analyze_symbol(self.source.as_ref(), symbol, &self.analysis, history.as_ref()).await
    }
}

/// Sleeps for `duration`; returns true if shutdown was requested meanwhile.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        res = shutdown.changed() => res.is_err() || *shutdown.borrow(),
    }
}
