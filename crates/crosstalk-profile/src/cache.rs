//! TTL cache over a profile store.

use crate::snapshot::ProfileSnapshot;
use crate::store::{ProfileStore, ProfileStoreError};
use crosstalk_foundation::{Clock, SharedClock};
use crosstalk_tts::VoiceCatalog;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct CachedProfile {
    snapshot: ProfileSnapshot,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedProfile {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.cached_at) > self.ttl
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub expired_entries: usize,
    pub ttl_secs: u64,
}

/// Process-local profile cache.
///
/// `get` fetches and caches on miss; `put` is used by the profile CRUD
/// surface to pre-populate at room-create / token-mint time; writes to a
/// profile invalidate its entry. A background sweeper evicts expired
/// entries so the map does not grow with one-shot identities.
pub struct ProfileCache {
    store: Arc<dyn ProfileStore>,
    catalog: Arc<VoiceCatalog>,
    entries: RwLock<HashMap<String, CachedProfile>>,
    ttl: Duration,
    clock: SharedClock,
}

impl ProfileCache {
    pub fn new(store: Arc<dyn ProfileStore>, catalog: Arc<VoiceCatalog>) -> Self {
        Self::with_ttl(store, catalog, DEFAULT_TTL, crosstalk_foundation::real_clock())
    }

    pub fn with_ttl(
        store: Arc<dyn ProfileStore>,
        catalog: Arc<VoiceCatalog>,
        ttl: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            catalog,
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Get a snapshot, fetching from the store on miss or expiry. An
    /// identity with no store record gets the default profile, which is
    /// cached like any other so repeated misses stay cheap.
    pub async fn get(&self, identity: &str) -> Result<ProfileSnapshot, ProfileStoreError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(identity) {
                if !entry.is_expired(now) {
                    debug!(target: "profile", identity, "cache hit");
                    return Ok(entry.snapshot.clone());
                }
            }
        }

        let fetched = self.store.fetch(identity).await?;
        let snapshot = match fetched {
            Some(snapshot) => snapshot,
            None => {
                info!(target: "profile", identity, "no profile on record, using default");
                ProfileSnapshot::default_for(identity, &self.catalog).ok_or_else(|| {
                    ProfileStoreError::Malformed("voice catalog has no default voice".into())
                })?
            }
        };

        self.entries.write().insert(
            identity.to_string(),
            CachedProfile {
                snapshot: snapshot.clone(),
                cached_at: self.clock.now(),
                ttl: self.ttl,
            },
        );
        debug!(target: "profile", identity, "cached profile");
        Ok(snapshot)
    }

    /// Pre-populate an entry, e.g. from token-mint seed metadata.
    pub fn put(&self, snapshot: ProfileSnapshot) {
        self.entries.write().insert(
            snapshot.identity.clone(),
            CachedProfile {
                snapshot,
                cached_at: self.clock.now(),
                ttl: self.ttl,
            },
        );
    }

    /// Drop the entry for an identity; the next `get` refetches.
    pub fn invalidate(&self, identity: &str) {
        if self.entries.write().remove(identity).is_some() {
            debug!(target: "profile", identity, "cache invalidated");
        }
    }

    /// Remove expired entries, returning how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before - entries.len();
        if evicted > 0 {
            info!(target: "profile", evicted, "cache sweep evicted expired entries");
        }
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total_entries: entries.len(),
            active_entries: entries.len() - expired,
            expired_entries: expired,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Spawn the periodic sweeper. The task runs until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                cache.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StaticProfileStore;
    use crosstalk_foundation::{test_clock, Language};

    fn snapshot(identity: &str, language: Language) -> ProfileSnapshot {
        let catalog = VoiceCatalog::seeded();
        ProfileSnapshot {
            identity: identity.into(),
            native_language: language,
            voice_avatar: catalog.default_for(language).unwrap(),
            formal_tone: false,
            preserve_emotion: true,
            updated_at: 1,
        }
    }

    fn cache_with(
        store: Arc<StaticProfileStore>,
    ) -> (Arc<ProfileCache>, Arc<crosstalk_foundation::TestClock>) {
        let clock = test_clock();
        let cache = Arc::new(ProfileCache::with_ttl(
            store,
            Arc::new(VoiceCatalog::seeded()),
            DEFAULT_TTL,
            clock.clone(),
        ));
        (cache, clock)
    }

    #[tokio::test]
    async fn miss_fetches_and_caches() {
        let store = Arc::new(StaticProfileStore::new());
        store.insert(snapshot("maria", Language::Spanish));
        let (cache, _clock) = cache_with(store.clone());

        let profile = cache.get("maria").await.unwrap();
        assert_eq!(profile.native_language, Language::Spanish);

        // A store change is invisible until invalidation or expiry.
        store.remove("maria");
        let profile = cache.get("maria").await.unwrap();
        assert_eq!(profile.native_language, Language::Spanish);
    }

    #[tokio::test]
    async fn unknown_identity_gets_default_profile() {
        let store = Arc::new(StaticProfileStore::new());
        let (cache, _clock) = cache_with(store);

        let profile = cache.get("stranger").await.unwrap();
        assert_eq!(profile.native_language, Language::English);
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[tokio::test]
    async fn expired_entry_refetches() {
        let store = Arc::new(StaticProfileStore::new());
        store.insert(snapshot("maria", Language::Spanish));
        let (cache, clock) = cache_with(store.clone());

        cache.get("maria").await.unwrap();
        store.insert(snapshot("maria", Language::French));

        clock.advance(DEFAULT_TTL + Duration::from_secs(1));
        let profile = cache.get("maria").await.unwrap();
        assert_eq!(profile.native_language, Language::French);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let store = Arc::new(StaticProfileStore::new());
        store.insert(snapshot("john", Language::English));
        let (cache, _clock) = cache_with(store.clone());

        cache.get("john").await.unwrap();
        store.insert(snapshot("john", Language::Igbo));
        cache.invalidate("john");

        let profile = cache.get("john").await.unwrap();
        assert_eq!(profile.native_language, Language::Igbo);
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired() {
        let store = Arc::new(StaticProfileStore::new());
        store.insert(snapshot("old", Language::English));
        store.insert(snapshot("new", Language::English));
        let (cache, clock) = cache_with(store);

        cache.get("old").await.unwrap();
        clock.advance(DEFAULT_TTL + Duration::from_secs(1));
        cache.get("new").await.unwrap();

        assert_eq!(cache.sweep(), 1);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.expired_entries, 0);
    }

    #[tokio::test]
    async fn put_prepopulates_without_store() {
        let store = Arc::new(StaticProfileStore::new());
        let (cache, _clock) = cache_with(store);

        cache.put(snapshot("seeded", Language::Hausa));
        let profile = cache.get("seeded").await.unwrap();
        assert_eq!(profile.native_language, Language::Hausa);
    }
}
