//! Persistent summary cache keyed by `(content key, language)`.
//!
//! Entries live in the key-value store under [`CACHE_COLLECTION_KEY`] as one
//! JSON object mapping `"<content-key>|<language>"` to a [`CacheEntry`]. The
//! capacity and expiry are scalar store entries so operators can tune them
//! without a restart.
//!
//! Freshness: an entry of age `a` is returned iff `a <= expiry`. Stale
//! entries are not deleted by [`SummaryCache::get`]; they go first when
//! [`SummaryCache::set`] needs room. After that, eviction takes the oldest
//! entry by `(timestamp, key)`.

pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::{Language, ProviderKind, StoreError};

pub use store::{JsonFileKvStore, KvStore, MemoryKvStore};

/// Store key of the entry collection.
pub const CACHE_COLLECTION_KEY: &str = "summary_cache";
/// Store key of the maximum entry count.
pub const MAX_ENTRIES_KEY: &str = "cache_max_entries";
/// Store key of the expiry in days.
pub const EXPIRY_DAYS_KEY: &str = "cache_expiry_days";

pub const DEFAULT_MAX_ENTRIES: usize = 100;
pub const DEFAULT_EXPIRY_DAYS: u64 = 7;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// One cached summary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub summary: String,
    pub provider: ProviderKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Entry count and approximate storage footprint.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub count: usize,
    /// Serialized size of the collection, in bytes.
    pub size: usize,
}

/// Operator-tunable limits.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    pub max_entries: usize,
    pub expiry_days: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }
}

impl CacheSettings {
    fn expiry_millis(&self) -> i64 {
        i64::try_from(self.expiry_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(MILLIS_PER_DAY)
    }
}

/// Build the collection key for a content key and language.
pub fn cache_key(content_key: &str, language: Language) -> String {
    format!("{content_key}|{language}")
}

type Entries = BTreeMap<String, CacheEntry>;

/// The summary cache. Cheap to clone; clones share the store and the write
/// lock.
#[derive(Clone)]
pub struct SummaryCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write cycles on the collection.
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for SummaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryCache").finish_non_exhaustive()
    }
}

impl SummaryCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current limits, falling back to the defaults for missing or
    /// non-numeric store values.
    pub async fn settings(&self) -> Result<CacheSettings, StoreError> {
        let defaults = CacheSettings::default();
        let max_entries = self
            .store
            .get(MAX_ENTRIES_KEY)
            .await?
            .and_then(|v| v.as_u64())
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(defaults.max_entries);
        let expiry_days = self
            .store
            .get(EXPIRY_DAYS_KEY)
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(defaults.expiry_days);
        Ok(CacheSettings {
            max_entries,
            expiry_days,
        })
    }

    /// Persist new limits. A lower capacity takes effect on the next `set`.
    pub async fn configure(&self, settings: CacheSettings) -> Result<(), StoreError> {
        self.store
            .set(MAX_ENTRIES_KEY, Value::from(settings.max_entries as u64))
            .await?;
        self.store
            .set(EXPIRY_DAYS_KEY, Value::from(settings.expiry_days))
            .await
    }

    /// The fresh entry for `(content_key, language)`, if any.
    pub async fn get(
        &self,
        content_key: &str,
        language: Language,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let settings = self.settings().await?;
        let now = self.now_millis();
        let key = cache_key(content_key, language);
        let entry = self
            .load()
            .await?
            .remove(&key)
            .filter(|e| is_fresh(e, now, &settings));
        debug!(
            "cache {} for {key}",
            if entry.is_some() { "hit" } else { "miss" }
        );
        Ok(entry)
    }

    /// Insert or overwrite the entry for `(content_key, language)` stamped
    /// with the current time, evicting first when at capacity.
    pub async fn set(
        &self,
        content_key: &str,
        language: Language,
        summary: &str,
        provider: ProviderKind,
    ) -> Result<(), StoreError> {
        let settings = self.settings().await?;
        if settings.max_entries == 0 {
            debug!("cache disabled (max entries is 0); not storing {content_key}");
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let now = self.now_millis();
        let key = cache_key(content_key, language);
        let mut entries = self.load().await?;
        entries.remove(&key);

        if entries.len() >= settings.max_entries {
            let before = entries.len();
            entries.retain(|_, e| is_fresh(e, now, &settings));
            if entries.len() < before {
                debug!("cache dropped {} expired entries", before - entries.len());
            }
        }
        while entries.len() >= settings.max_entries {
            let Some(oldest) = oldest_key(&entries) else {
                break;
            };
            debug!("cache evicting {oldest}");
            entries.remove(&oldest);
        }

        entries.insert(
            key,
            CacheEntry {
                summary: summary.to_string(),
                provider,
                timestamp: now,
            },
        );
        self.save(&entries).await
    }

    pub async fn stats(&self) -> Result<CacheStats, StoreError> {
        let entries = self.load().await?;
        Ok(CacheStats {
            count: entries.len(),
            size: serde_json::to_string(&entries)?.len(),
        })
    }

    /// Remove every entry. Limits are kept.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.save(&Entries::new()).await
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    async fn load(&self) -> Result<Entries, StoreError> {
        match self.store.get(CACHE_COLLECTION_KEY).await? {
            None | Some(Value::Null) => Ok(Entries::new()),
            Some(value) => serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
                key: CACHE_COLLECTION_KEY.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn save(&self, entries: &Entries) -> Result<(), StoreError> {
        self.store
            .set(CACHE_COLLECTION_KEY, serde_json::to_value(entries)?)
            .await
    }
}

fn is_fresh(entry: &CacheEntry, now: i64, settings: &CacheSettings) -> bool {
    now.saturating_sub(entry.timestamp) <= settings.expiry_millis()
}

fn oldest_key(entries: &Entries) -> Option<String> {
    entries
        .iter()
        .min_by(|(ka, a), (kb, b)| (a.timestamp, ka).cmp(&(b.timestamp, kb)))
        .map(|(k, _)| k.clone())
}
