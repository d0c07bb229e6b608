use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use chrono::Utc;
use chrono_tz::Tz;
use shared::templates::OutcomeMessageTemplate;
use shared::{Direction, Signal, SignalStatus};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;

use super::market_data::MarketDataSource;
use super::notifier::MessageSink;
use crate::repositories::SignalRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: SignalStatus,
    /// No further change is possible.
    pub finished: bool,
}

fn reached(direction: Direction, price: f64, level: f64) -> bool {
    match direction {
        Direction::Long => price >= level,
        Direction::Short => price <= level,
    }
}

/// Applies one observed price to a signal's status. Statuses only move
/// forward: a lower TP after a higher one changes nothing, and SL counts
/// as a loss only before any TP was reached.
pub fn next_status(signal: &Signal, current: SignalStatus, price: f64) -> Transition {
    if matches!(current, SignalStatus::Tp3 | SignalStatus::Sl) {
        return Transition {
            status: current,
            finished: true,
        };
    }

    let hit = [SignalStatus::Tp1, SignalStatus::Tp2, SignalStatus::Tp3]
        .into_iter()
        .zip(signal.take_profits())
        .filter(|(_, level)| reached(signal.direction, price, *level))
        .map(|(status, _)| status)
        .max();

    if let Some(status) = hit.filter(|s| *s > current) {
        return Transition {
            status,
            finished: status == SignalStatus::Tp3,
        };
    }

    let stopped = match signal.direction {
        Direction::Long => price <= signal.sl,
        Direction::Short => price >= signal.sl,
    };
    if stopped {
        let status = if current == SignalStatus::Pending {
            SignalStatus::Sl
        } else {
            current
        };
        return Transition { status, finished: true };
    }

    Transition {
        status: current,
        finished: false,
    }
}

/// Background outcome tracking, one task per dispatched signal.
pub struct Tracker {
    source: Arc<dyn MarketDataSource>,
    repo: Arc<SignalRepository>,
    alerts: Option<Arc<dyn MessageSink>>,
    poll: Duration,
    timeout: Duration,
    timezone: Tz,
    tasks: Mutex<JoinSet<()>>,
    shutdown: watch::Sender<bool>,
}

impl Tracker {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        repo: Arc<SignalRepository>,
        alerts: Option<Arc<dyn MessageSink>>,
        poll: Duration,
        timeout: Duration,
        timezone: Tz,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            repo,
            alerts,
            poll,
            timeout,
            timezone,
            tasks: Mutex::new(JoinSet::new()),
            shutdown,
        }
    }

    /// Starts tracking a stored signal. The timeout counts from the signal's
    /// creation, so resumed signals only get what is left of it.
    pub async fn track(&self, signal: Signal) {
        let Some(id) = signal.id else {
            tracing::warn!("[{}] Not tracking a signal without id", signal.symbol);
            return;
        };
        let age = (Utc::now() - signal.timestamp).to_std().unwrap_or_default();
        let remaining = self.timeout.saturating_sub(age);
        if remaining.is_zero() {
            tracing::info!("[{}] Signal {} is past its tracking window", signal.symbol, id);
            return;
        }

        let job = TrackJob {
            signal,
            id,
            source: self.source.clone(),
            repo: self.repo.clone(),
            alerts: self.alerts.clone(),
            poll: self.poll,
            remaining,
            timezone: self.timezone,
            shutdown: self.shutdown.subscribe(),
        };

        let mut tasks = self.tasks.lock().await;
        if *self.shutdown.borrow() {
            tracing::info!("[{}] Shutting down, signal {} not tracked", job.signal.symbol, id);
            return;
        }
        // Reap finished tasks so the set does not grow without bound.
        while let Some(res) = tasks.try_join_next() {
            if let Err(e) = res {
                tracing::error!("Tracking task failed: {}", e);
            }
        }
        tasks.spawn(job.run());
    }

    pub async fn active(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Waits for every running task to end on its own. The set is taken out
    /// first so `track` and `active` stay responsive meanwhile.
    pub async fn wait_idle(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!("Tracking task failed: {}", e);
            }
        }
    }

    /// Signals every task to stop and waits for them.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.wait_idle().await;
    }
}

struct TrackJob {
    signal: Signal,
    id: i32,
    source: Arc<dyn MarketDataSource>,
    repo: Arc<SignalRepository>,
    alerts: Option<Arc<dyn MessageSink>>,
    poll: Duration,
    remaining: Duration,
    timezone: Tz,
    shutdown: watch::Receiver<bool>,
}

impl TrackJob {
    async fn run(mut self) {
        let symbol = self.signal.symbol.clone();
        let deadline = tokio::time::Instant::now() + self.remaining;
        let mut status = self.signal.status;
        let mut interval = tokio::time::interval(self.poll);
        tracing::info!("[{}] Tracking signal {} ({})", symbol, self.id, self.signal.direction);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::debug!("[{}] Tracking of {} stopped by shutdown", symbol, self.id);
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!("[{}] Tracking of {} timed out at {}", symbol, self.id, status);
                    break;
                }
                _ = interval.tick() => {}
            }

            let price = match self.source.fetch_price(&symbol).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!("[{}] Price fetch failed: {:#}", symbol, e);
                    continue;
                }
            };

            let transition = next_status(&self.signal, status, price);
            if transition.status != status {
                status = transition.status;
                self.record(status, price).await;
            }
            if transition.finished {
                tracing::info!("[{}] Signal {} finished at {}", symbol, self.id, status);
                break;
            }
        }
    }

    async fn record(&self, status: SignalStatus, price: f64) {
        let now = Utc::now();
        tracing::info!("[{}] Signal {} -> {} at {}", self.signal.symbol, self.id, status, price);
        if let Err(e) = self.repo.update_status(self.id, status, now).await {
            tracing::error!("[{}] Failed to store status {}: {:#}", self.signal.symbol, status, e);
        }

        let Some(alerts) = &self.alerts else {
            return;
        };
        let text = match OutcomeMessageTemplate::new(&self.signal, status, price, now, self.timezone).render() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("[{}] Outcome render failed: {}", self.signal.symbol, e);
                return;
            }
        };
        if let Err(e) = alerts.send_html(&text).await {
            tracing::warn!("[{}] Outcome alert not sent: {}", self.signal.symbol, e);
        }
    }
}
