use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

/// Last signal time per symbol. A symbol inside the window is skipped.
#[derive(Debug, Clone)]
pub struct CooldownStore {
    window: Duration,
    last_signal: HashMap<String, DateTime<Utc>>,
}

impl CooldownStore {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_signal: HashMap::new(),
        }
    }

    pub fn is_active(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.last_signal
            .get(symbol)
            .map(|at| now - *at < self.window)
            .unwrap_or(false)
    }

    pub fn record(&mut self, symbol: &str, at: DateTime<Utc>) {
        self.last_signal.insert(symbol.to_string(), at);
    }

    /// Drops expired entries, returning how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.last_signal.len();
        let window = self.window;
        self.last_signal.retain(|_, at| now - *at < window);
        before - self.last_signal.len()
    }

    pub fn len(&self) -> usize {
        self.last_signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_signal.is_empty()
    }

    /// Reads a saved map. A missing file yields an empty store.
    pub async fn load(path: &Path, window: Duration) -> Result<Self> {
        let mut store = Self::new(window);
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                store.last_signal = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt cooldown file {}", path.display()))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }
        Ok(store)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.last_signal)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window() {
        let mut store = CooldownStore::new(Duration::hours(4));
        assert!(!store.is_active("BTC/USDT", t0()));

        store.record("BTC/USDT", t0());
        assert!(store.is_active("BTC/USDT", t0() + Duration::hours(3)));
        assert!(!store.is_active("BTC/USDT", t0() + Duration::hours(4)));
        assert!(!store.is_active("ETH/USDT", t0()));
    }

    #[test]
    fn test_prune() {
        let mut store = CooldownStore::new(Duration::hours(4));
        store.record("BTC/USDT", t0());
        store.record("ETH/USDT", t0() + Duration::hours(2));

        assert_eq!(store.prune(t0() + Duration::hours(5)), 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_active("ETH/USDT", t0() + Duration::hours(5)));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cooldowns.json");

        let mut store = CooldownStore::new(Duration::hours(4));
        store.record("BTC/USDT", t0());
        store.save(&path).await.unwrap();

        let loaded = CooldownStore::load(&path, Duration::hours(4)).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.is_active("BTC/USDT", t0() + Duration::minutes(1)));
    }

    #[tokio::test]
    async fn test_load_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        let store = CooldownStore::load(&missing, Duration::hours(4)).await.unwrap();
        assert!(store.is_empty());

        let corrupt = dir.path().join("bad.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        assert!(CooldownStore::load(&corrupt, Duration::hours(4)).await.is_err());
    }
}
