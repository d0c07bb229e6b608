use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use shared::{get_db_connection, Config};
use teloxide::Bot;
use tokio::sync::RwLock;

use crate::repositories::SignalRepository;
use crate::services::aggregator::AnalysisSettings;
use crate::services::market_data::{BinanceClient, CachedMarketData, MarketDataSource};
use crate::services::notifier::{MessageSink, Notifier, TelegramSink};
use crate::services::scanner::ScanStats;
use crate::services::tracker::Tracker;

pub type HandlerResult = Result<(), anyhow::Error>;

pub struct AppState {
    pub config: Config,
    pub cache: Arc<CachedMarketData<BinanceClient>>,
    pub market: Arc<dyn MarketDataSource>,
    pub repo: Arc<SignalRepository>,
    pub tracker: Arc<Tracker>,
    pub notifier: Arc<Notifier>,
    pub analysis: AnalysisSettings,
    pub stats: Arc<RwLock<ScanStats>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn new(config: Config, bot: Bot) -> Result<Self, anyhow::Error> {
        let db = get_db_connection(&config.database_url).await?;
        Migrator::up(&db, None).await?;
        tracing::info!("Connected to database and applied migrations");

        let exchange = BinanceClient::new(&config.exchange_base_url)?;
        let cache = Arc::new(CachedMarketData::new(exchange, Duration::from_secs(config.cache_ttl_secs)));
        let market: Arc<dyn MarketDataSource> = cache.clone();

        let repo = Arc::new(SignalRepository::new(Arc::new(db)));
        let sink: Arc<dyn MessageSink> = Arc::new(TelegramSink::new(bot, config.chat_id));
        let tracker = Arc::new(Tracker::new(
            market.clone(),
            repo.clone(),
            Some(sink.clone()),
            Duration::from_secs(config.track_poll_secs),
            Duration::from_secs(config.track_timeout_secs),
            config.timezone,
        ));
        let notifier = Arc::new(Notifier::new(
            sink,
            repo.clone(),
            tracker.clone(),
            config.timezone,
            config.bot_name.clone(),
            config.send_retries,
            Duration::from_secs(config.send_retry_delay_secs),
        ));

        Ok(AppState {
            analysis: AnalysisSettings::from_config(&config),
            config,
            cache,
            market,
            repo,
            tracker,
            notifier,
            stats: Arc::new(RwLock::new(ScanStats::default())),
            started_at: Utc::now(),
        })
    }

    /// Restarts tracking for pending signals still inside their window.
    pub async fn resume_tracking(&self) -> Result<usize, anyhow::Error> {
        let window = chrono::Duration::seconds(self.config.track_timeout_secs as i64);
        let pending = self.repo.list_pending_since(Utc::now() - window).await?;
        let count = pending.len();
        for signal in pending {
            self.tracker.track(signal).await;
        }
        Ok(count)
    }
}
