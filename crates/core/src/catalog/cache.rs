use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{info, warn};

use crate::{
    models::CatalogResponse,
    storage::{KeyValueStore, StoreOp, CATALOG_EXPIRY_KEY, CATALOG_KEY},
};

use super::{CatalogSource, FetchError};

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A stored catalog payload and the instant it stops being trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEnvelope {
    /// Last successful catalog response.
    pub payload: CatalogResponse,
    /// Payload is valid strictly before this instant.
    pub expires_at: DateTime<Utc>,
}

impl CacheEnvelope {
    /// Whether the payload may be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Coarse state of the stored envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing usable is stored.
    Empty,
    /// A payload is stored but its window has passed.
    Expired,
    /// A payload is stored and valid until `expires_at`.
    Fresh {
        /// End of the validity window.
        expires_at: DateTime<Utc>,
    },
}

/// Serves the catalog from storage while fresh, refetching otherwise.
#[derive(Clone)]
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    clock: Clock,
}

impl CatalogCache {
    /// Build a cache over `source`, persisting envelopes into `store`.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn KeyValueStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            store,
            ttl,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the clock, mainly for tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Return the cached catalog if still valid, otherwise fetch and store a
    /// new one.
    pub async fn get_items(&self) -> Result<CatalogResponse, FetchError> {
        let now = (self.clock)();
        if let Some(envelope) = self.read_envelope()? {
            if envelope.is_fresh(now) {
                info!(expires_at = %envelope.expires_at, "using cached catalog");
                return Ok(envelope.payload);
            }
        }

        info!("fetching fresh catalog");
        let payload = self.source.fetch().await?;
        let envelope = CacheEnvelope {
            payload,
            expires_at: now + self.ttl,
        };
        if let Err(err) = self.write_envelope(&envelope) {
            warn!(?err, "failed to store catalog envelope");
        }
        Ok(envelope.payload)
    }

    /// Drop the stored envelope so the next access refetches.
    pub fn clear_cache(&self) -> anyhow::Result<()> {
        self.store.apply(vec![
            StoreOp::Remove(CATALOG_KEY.to_string()),
            StoreOp::Remove(CATALOG_EXPIRY_KEY.to_string()),
        ])?;
        info!("catalog cache cleared");
        Ok(())
    }

    /// Describe the stored envelope relative to the current time.
    pub fn status(&self) -> CacheStatus {
        let expires_at = match self.read_expiry() {
            Ok(Some(expires_at)) => expires_at,
            Ok(None) => return CacheStatus::Empty,
            Err(err) => {
                warn!(?err, "failed to read catalog expiry");
                return CacheStatus::Empty;
            }
        };
        if (self.clock)() < expires_at {
            CacheStatus::Fresh { expires_at }
        } else {
            CacheStatus::Expired
        }
    }

    /// Whole minutes until the stored envelope expires, zero when expired or
    /// absent.
    pub fn minutes_until_refresh(&self) -> i64 {
        match self.read_expiry() {
            Ok(Some(expires_at)) => {
                let remaining = (expires_at - (self.clock)()).num_milliseconds();
                (remaining as f64 / 60_000.0).round().max(0.0) as i64
            }
            _ => 0,
        }
    }

    /// Load the stored envelope. Unusable entries read as absent.
    pub fn read_envelope(&self) -> Result<Option<CacheEnvelope>, FetchError> {
        let Some(raw_payload) = self.store.get(CATALOG_KEY)? else {
            return Ok(None);
        };
        let Some(expires_at) = self.read_expiry()? else {
            warn!("cached catalog has no expiry; ignoring it");
            return Ok(None);
        };
        match serde_json::from_str(&raw_payload) {
            Ok(payload) => Ok(Some(CacheEnvelope {
                payload,
                expires_at,
            })),
            Err(err) => {
                warn!(%err, "cached catalog is unreadable; ignoring it");
                Ok(None)
            }
        }
    }

    fn read_expiry(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(CATALOG_EXPIRY_KEY)? else {
            return Ok(None);
        };
        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        if parsed.is_none() {
            warn!(value = %raw, "invalid catalog expiry");
        }
        Ok(parsed)
    }

    fn write_envelope(&self, envelope: &CacheEnvelope) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&envelope.payload)?;
        self.store.apply(vec![
            StoreOp::Set(CATALOG_KEY.to_string(), payload),
            StoreOp::Set(
                CATALOG_EXPIRY_KEY.to_string(),
                envelope.expires_at.timestamp_millis().to_string(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::{models::Item, storage::MemoryStore};

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch(&self) -> Result<CatalogResponse, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(FetchError::Api("unavailable".to_string()));
            }
            Ok(CatalogResponse::from_items(vec![Item {
                id: format!("item-{call}"),
                name: format!("Item {call}"),
                width: 1,
                height: 1,
                sell_for: Vec::new(),
                buy_for: Vec::new(),
            }]))
        }
    }

    /// Reads find nothing and every write fails.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn apply(&self, _batch: Vec<StoreOp>) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("storage is read-only"))
        }
    }

    fn manual_clock() -> (Arc<Mutex<DateTime<Utc>>>, Clock) {
        let start = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let now = Arc::new(Mutex::new(start));
        let handle = now.clone();
        (now, Arc::new(move || *handle.lock()))
    }

    #[tokio::test]
    async fn serves_cached_payload_within_ttl() -> anyhow::Result<()> {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        let (now, clock) = manual_clock();
        let cache =
            CatalogCache::new(source.clone(), store, Duration::minutes(30)).with_clock(clock);

        let first = cache.get_items().await?;
        *now.lock() += Duration::minutes(29);
        let second = cache.get_items().await?;

        assert_eq!(source.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.minutes_until_refresh(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn refetches_once_expired() -> anyhow::Result<()> {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        let (now, clock) = manual_clock();
        let cache =
            CatalogCache::new(source.clone(), store, Duration::minutes(30)).with_clock(clock);

        cache.get_items().await?;
        *now.lock() += Duration::minutes(30);
        assert_eq!(cache.status(), CacheStatus::Expired);
        let refreshed = cache.get_items().await?;

        assert_eq!(source.calls(), 2);
        assert_eq!(refreshed.items()[0].id, "item-2");
        assert!(matches!(cache.status(), CacheStatus::Fresh { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn clear_cache_forces_reload() -> anyhow::Result<()> {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        let cache = CatalogCache::new(source.clone(), store.clone(), Duration::minutes(30));

        cache.get_items().await?;
        cache.clear_cache()?;
        assert_eq!(store.get(CATALOG_KEY)?, None);
        assert_eq!(store.get(CATALOG_EXPIRY_KEY)?, None);
        assert_eq!(cache.status(), CacheStatus::Empty);

        cache.get_items().await?;
        assert_eq!(source.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_or_partial_envelope_is_a_miss() -> anyhow::Result<()> {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        let (now, clock) = manual_clock();
        let future = (*now.lock() + Duration::hours(1)).timestamp_millis();
        store.set(CATALOG_KEY, "{not json".to_string())?;
        store.set(CATALOG_EXPIRY_KEY, future.to_string())?;

        let cache = CatalogCache::new(source.clone(), store.clone(), Duration::minutes(30))
            .with_clock(clock);
        assert!(cache.read_envelope()?.is_none());
        cache.get_items().await?;
        assert_eq!(source.calls(), 1);

        store.remove(CATALOG_EXPIRY_KEY)?;
        assert!(cache.read_envelope()?.is_none());
        cache.get_items().await?;
        assert_eq!(source.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_envelope() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (now, clock) = manual_clock();
        let good = CatalogCache::new(
            CountingSource::new(false),
            store.clone(),
            Duration::minutes(30),
        )
        .with_clock(clock.clone());
        good.get_items().await?;
        let stored = store.get(CATALOG_KEY)?;

        *now.lock() += Duration::hours(1);
        let failing = CatalogCache::new(
            CountingSource::new(true),
            store.clone(),
            Duration::minutes(30),
        )
        .with_clock(clock);
        let err = failing.get_items().await.expect_err("fetch should fail");
        assert!(matches!(err, FetchError::Api(_)));
        assert_eq!(store.get(CATALOG_KEY)?, stored);
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_store_still_returns_fresh_payload() -> anyhow::Result<()> {
        let source = CountingSource::new(false);
        let cache =
            CatalogCache::new(source.clone(), Arc::new(ReadOnlyStore), Duration::minutes(30));

        let response = cache.get_items().await?;
        assert_eq!(response.items()[0].id, "item-1");
        assert_eq!(cache.status(), CacheStatus::Empty);

        cache.get_items().await?;
        assert_eq!(source.calls(), 2);
        Ok(())
    }
}
