//! Per-site result cache with time-based expiry.
//!
//! Entries live in the shared [`KeyValueStore`] under `cache:<domain>`. Each
//! site key is ABSENT, FRESH or STALE:
//!
//! - a write always makes the entry FRESH (overwriting whatever was there);
//! - an entry becomes STALE once `now - created_at >= ttl`, judged at read
//!   time, and is then treated exactly like ABSENT;
//! - [`ResultCache::clear_all`] drops every `cache:` key and nothing else.
//!
//! Concurrent writes for one site key are last-write-wins.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use couponfinder_shared::{AppConfig, CouponFinderError, Result};
use couponfinder_storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::record::AcceptedRecord;

/// Namespace prefix for every cache key.
pub const CACHE_PREFIX: &str = "cache:";

/// Storage key for a site's cache entry.
pub fn cache_key(site_key: &str) -> String {
    format!("{CACHE_PREFIX}{site_key}")
}

/// The persisted form of one cached search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub site_key: String,
    pub records: Vec<AcceptedRecord>,
    pub created_at: DateTime<Utc>,
}

/// A fresh cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub records: Vec<AcceptedRecord>,
    /// Time since the entry was written, never negative.
    pub age: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// One row of [`ResultCache::entries`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheListing {
    pub site_key: String,
    pub record_count: usize,
    pub created_at: DateTime<Utc>,
    pub freshness: Freshness,
}

/// `true` while `now - created_at < ttl`. The boundary itself is stale.
pub fn is_fresh(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now - created_at < ttl
}

/// Keyed store of accepted record sets.
pub struct ResultCache<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    ttl: Duration,
}

impl<S: KeyValueStore> ResultCache<S, SystemClock> {
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, SystemClock)
    }

    /// Build with the TTL from `[cache].ttl_minutes`.
    pub fn from_config(store: Arc<S>, config: &AppConfig) -> Result<Self> {
        let ttl = i64::try_from(config.cache.ttl_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| CouponFinderError::config("cache.ttl_minutes out of range"))?;
        Ok(Self::new(store, ttl))
    }
}

impl<S: KeyValueStore, C: Clock> ResultCache<S, C> {
    pub fn with_clock(store: Arc<S>, ttl: Duration, clock: C) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached records for `site_key` if the entry is fresh.
    #[instrument(skip(self))]
    pub async fn get(&self, site_key: &str) -> Result<Option<CachedResult>> {
        let key = cache_key(site_key);
        let mut found = self.store.get(&[key.as_str()]).await?;

        let Some(value) = found.remove(&key) else {
            debug!("cache miss");
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "undecodable cache entry, treating as absent");
                return Ok(None);
            }
        };

        let now = self.clock.now();
        if !is_fresh(entry.created_at, now, self.ttl) {
            debug!(created_at = %entry.created_at, "cache entry stale");
            return Ok(None);
        }

        let age = (now - entry.created_at).max(Duration::zero());
        debug!(age_secs = age.num_seconds(), records = entry.records.len(), "cache hit");
        Ok(Some(CachedResult {
            records: entry.records,
            age,
        }))
    }

    /// Store `records` for `site_key`, replacing any previous entry.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn put(&self, site_key: &str, records: &[AcceptedRecord]) -> Result<()> {
        let entry = CacheEntry {
            site_key: site_key.to_string(),
            records: records.to_vec(),
            created_at: self.clock.now(),
        };
        let value = serde_json::to_value(&entry)
            .map_err(|e| CouponFinderError::Serialization(e.to_string()))?;

        self.store
            .set(HashMap::from([(cache_key(site_key), value)]))
            .await?;
        debug!("cached results");
        Ok(())
    }

    /// Remove every cache entry. Returns how many were removed.
    pub async fn clear_all(&self) -> Result<usize> {
        let all = self.store.get_all().await?;
        let keys: Vec<&str> = all
            .keys()
            .map(String::as_str)
            .filter(|k| k.starts_with(CACHE_PREFIX))
            .collect();

        if !keys.is_empty() {
            self.store.remove(&keys).await?;
        }

        info!(removed = keys.len(), "cache cleared");
        Ok(keys.len())
    }

    /// List every decodable cache entry, fresh or stale, sorted by site key.
    pub async fn entries(&self) -> Result<Vec<CacheListing>> {
        let now = self.clock.now();
        let mut listings: Vec<CacheListing> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|(k, _)| k.starts_with(CACHE_PREFIX))
            .filter_map(|(key, value)| match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => Some(CacheListing {
                    freshness: if is_fresh(entry.created_at, now, self.ttl) {
                        Freshness::Fresh
                    } else {
                        Freshness::Stale
                    },
                    record_count: entry.records.len(),
                    created_at: entry.created_at,
                    site_key: entry.site_key,
                }),
                Err(e) => {
                    warn!(%key, error = %e, "skipping undecodable cache entry");
                    None
                }
            })
            .collect();

        listings.sort_by(|a, b| a.site_key.cmp(&b.site_key));
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use couponfinder_storage::MemoryStore;
    use serde_json::json;

    fn records(codes: &[&str]) -> Vec<AcceptedRecord> {
        codes
            .iter()
            .map(|c| AcceptedRecord::new((*c).to_string(), format!("{c} deal")))
            .collect()
    }

    fn cache() -> (Arc<MemoryStore>, Arc<ManualClock>, ResultCache<MemoryStore, Arc<ManualClock>>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ResultCache::with_clock(store.clone(), Duration::minutes(30), clock.clone());
        (store, clock, cache)
    }

    #[tokio::test]
    async fn absent_entry_is_a_miss() {
        let (_, _, cache) = cache();
        assert!(cache.get("kohls.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_returns_equal_copy() {
        let (_, clock, cache) = cache();
        let stored = records(&["SAVE20", "FREESHIP"]);
        cache.put("kohls.com", &stored).await.unwrap();

        clock.advance(Duration::minutes(12));
        let hit = cache.get("kohls.com").await.unwrap().expect("fresh hit");
        assert_eq!(hit.records, stored);
        assert_eq!(hit.age, Duration::minutes(12));
    }

    #[tokio::test]
    async fn ttl_boundary_is_exclusive() {
        let (_, clock, cache) = cache();
        cache.put("kohls.com", &records(&["SAVE20"])).await.unwrap();

        clock.advance(Duration::minutes(29) + Duration::seconds(59));
        assert!(cache.get("kohls.com").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(cache.get("kohls.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_entry_is_kept_until_overwritten() {
        let (store, clock, cache) = cache();
        cache.put("kohls.com", &records(&["OLD123"])).await.unwrap();
        clock.advance(Duration::hours(2));

        assert!(cache.get("kohls.com").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);

        cache.put("kohls.com", &records(&["NEW456"])).await.unwrap();
        let hit = cache.get("kohls.com").await.unwrap().expect("fresh after overwrite");
        assert_eq!(hit.records, records(&["NEW456"]));
        assert_eq!(hit.age, Duration::zero());
    }

    #[tokio::test]
    async fn empty_record_set_is_cached() {
        let (_, _, cache) = cache();
        cache.put("nocodes.com", &[]).await.unwrap();
        let hit = cache.get("nocodes.com").await.unwrap().expect("hit");
        assert!(hit.records.is_empty());
    }

    #[tokio::test]
    async fn clear_all_only_touches_cache_namespace() {
        let (store, _, cache) = cache();
        cache.put("kohls.com", &records(&["SAVE20"])).await.unwrap();
        cache.put("regmovies.com", &records(&["REGAL15"])).await.unwrap();
        store
            .set(HashMap::from([
                ("credential:api_key".to_string(), json!("c2VjcmV0")),
                ("settings:model".to_string(), json!("gemini-1.5-pro")),
            ]))
            .await
            .unwrap();

        assert_eq!(cache.clear_all().await.unwrap(), 2);
        assert!(cache.get("kohls.com").await.unwrap().is_none());

        let remaining = store.get_all().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains_key("credential:api_key"));
        assert!(remaining.contains_key("settings:model"));

        assert_eq!(cache.clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let (store, _, cache) = cache();
        store
            .set(HashMap::from([(cache_key("broken.com"), json!({"coupons": "?"}))]))
            .await
            .unwrap();

        assert!(cache.get("broken.com").await.unwrap().is_none());
        assert!(cache.entries().await.unwrap().is_empty());
        assert_eq!(cache.clear_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_writes_for_different_sites_do_not_interfere() {
        let (_, _, cache) = cache();
        let a = records(&["AAA111"]);
        let b = records(&["BBB222"]);

        let (ra, rb) = tokio::join!(cache.put("a.com", &a), cache.put("b.com", &b));
        ra.unwrap();
        rb.unwrap();

        assert_eq!(cache.get("a.com").await.unwrap().unwrap().records, a);
        assert_eq!(cache.get("b.com").await.unwrap().unwrap().records, b);
    }

    #[tokio::test]
    async fn entries_report_freshness() {
        let (_, clock, cache) = cache();
        cache.put("old.com", &records(&["OLD123"])).await.unwrap();
        clock.advance(Duration::minutes(45));
        cache.put("new.com", &records(&["NEW456", "NEW789"])).await.unwrap();

        let listing = cache.entries().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].site_key, "new.com");
        assert_eq!(listing[0].freshness, Freshness::Fresh);
        assert_eq!(listing[0].record_count, 2);
        assert_eq!(listing[1].site_key, "old.com");
        assert_eq!(listing[1].freshness, Freshness::Stale);
    }

    #[test]
    fn freshness_is_a_pure_function_of_time() {
        let t = Utc::now();
        let ttl = Duration::minutes(30);
        assert!(is_fresh(t, t, ttl));
        assert!(is_fresh(t, t + Duration::minutes(29) + Duration::seconds(59), ttl));
        assert!(!is_fresh(t, t + ttl, ttl));
    }

    #[test]
    fn ttl_comes_from_config() {
        let mut config = AppConfig::default();
        config.cache.ttl_minutes = 5;
        let cache = ResultCache::from_config(Arc::new(MemoryStore::new()), &config).unwrap();
        assert_eq!(cache.ttl(), Duration::minutes(5));
    }

    #[test]
    fn oversized_ttl_is_a_config_error() {
        let mut config = AppConfig::default();
        for minutes in [1_000_000_000_000_000, u64::MAX] {
            config.cache.ttl_minutes = minutes;
            let err = ResultCache::from_config(Arc::new(MemoryStore::new()), &config)
                .err()
                .expect("out-of-range TTL rejected");
            assert!(matches!(err, CouponFinderError::Config { .. }));
            assert!(err.to_string().contains("ttl_minutes"));
        }
    }
}
