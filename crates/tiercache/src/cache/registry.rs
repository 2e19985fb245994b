//! Named-cache registry.
//!
//! A registry owns the shared durable tier handle and hands out one
//! [`TieredCache`] per name. The first lookup of a name builds the cache;
//! every later lookup, concurrent or not, returns the same `Arc`. The
//! session store is held the same way, so all callers share one session L1.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use tiercache_api::{CacheResult, SessionIdGenerator};
use tokio::task::JoinHandle;

use super::codec::{CacheKey, Namespace};
use super::durable::DurableTier;
use super::session::TieredSessionStore;
use super::tiered::{CacheValue, TierOptions, TieredCache};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{CacheSettings, SessionSettings};

pub struct CacheRegistry<K, V> {
    caches: DashMap<String, Arc<TieredCache<K, V>>>,
    sessions: OnceLock<Arc<TieredSessionStore>>,
    durable: Arc<dyn DurableTier>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl<K: CacheKey, V: CacheValue> CacheRegistry<K, V> {
    pub fn new(durable: Arc<dyn DurableTier>, settings: CacheSettings) -> Self {
        Self::with_clock(durable, settings, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(
        durable: Arc<dyn DurableTier>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            caches: DashMap::new(),
            sessions: OnceLock::new(),
            durable,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn durable(&self) -> &Arc<dyn DurableTier> {
        &self.durable
    }

    /// Returns the cache registered under `name`, building it on first use.
    ///
    /// Construction happens under the map's entry lock, so concurrent first
    /// lookups of one name can never produce two caches.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::InvalidName` if `name` cannot form an isolated
    /// namespace.
    pub fn get_or_create(&self, name: &str) -> CacheResult<Arc<TieredCache<K, V>>> {
        if let Some(cache) = self.caches.get(name) {
            return Ok(Arc::clone(cache.value()));
        }

        let namespace = Namespace::cache(&self.settings.key_prefix, name)?;
        let cache = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    cache = %name,
                    prefix = %namespace.prefix(),
                    "creating tiered cache"
                );
                Arc::new(TieredCache::new(
                    namespace,
                    Arc::clone(&self.durable),
                    Arc::clone(&self.clock),
                    self.tier_options(),
                ))
            })
            .value()
            .clone();
        Ok(cache)
    }

    fn tier_options(&self) -> TierOptions {
        TierOptions {
            timeout: self.settings.timeout(),
            flush_interval: self.settings.flush_interval(),
            max_entries: self.settings.local_max_entries,
        }
    }

    /// Session store sharing this registry's durable tier and clock.
    ///
    /// The first call builds the store from `session` and `id_generator`;
    /// later calls return that same store and ignore their arguments.
    pub fn session_store(
        &self,
        session: &SessionSettings,
        id_generator: Arc<dyn SessionIdGenerator>,
    ) -> Arc<TieredSessionStore> {
        let store = self.sessions.get_or_init(|| {
            let options = TierOptions {
                timeout: session.local_timeout(),
                ..self.tier_options()
            };
            tracing::info!(prefix = %self.settings.key_prefix, "creating session store");
            Arc::new(TieredSessionStore::new(
                &self.settings.key_prefix,
                Arc::clone(&self.durable),
                Arc::clone(&self.clock),
                options,
                id_generator,
            ))
        });
        Arc::clone(store)
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<TieredCache<K, V>>> {
        self.caches
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Flushes every cache and the session store, returning the number of
    /// values written.
    ///
    /// Stops at the first failing cache.
    pub async fn flush_all(&self) -> CacheResult<usize> {
        let mut written = 0;
        for cache in self.snapshot() {
            written += cache.flush().await?;
        }
        if let Some(sessions) = self.sessions.get() {
            written += sessions.cache().flush().await?;
        }
        Ok(written)
    }

    /// Spawns a background task that flushes pending writes and purges
    /// expired local entries every `period`.
    ///
    /// Failures are logged; the task keeps running until aborted.
    pub fn spawn_maintenance(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_maintenance().await;
            }
        })
    }

    async fn run_maintenance(&self) {
        for cache in self.snapshot() {
            maintain(&cache).await;
        }
        if let Some(sessions) = self.sessions.get() {
            maintain(sessions.cache()).await;
        }
    }
}

async fn maintain<K: CacheKey, V: CacheValue>(cache: &TieredCache<K, V>) {
    if let Err(e) = cache.flush().await {
        tracing::warn!(cache = %cache.name(), error = %e, "background flush failed");
    }
    let purged = cache.purge_expired();
    if purged > 0 {
        tracing::debug!(cache = %cache.name(), purged, "expired local entries purged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::durable::MemoryDurableTier;

    fn registry() -> CacheRegistry<String, String> {
        CacheRegistry::new(Arc::new(MemoryDurableTier::new()), CacheSettings::default())
    }

    #[test]
    fn test_same_name_same_instance() {
        let registry = registry();
        let a = registry.get_or_create("users").unwrap();
        let b = registry.get_or_create("users").unwrap();
        let c = registry.get_or_create("roles").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["roles".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let registry = registry();
        assert!(registry.get_or_create("a:b").is_err());
        assert!(registry.get_or_create("session").is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_flushes_pending_writes() {
        let durable = Arc::new(MemoryDurableTier::new());
        let settings = CacheSettings {
            flush_interval_ms: 3_600_000,
            ..CacheSettings::default()
        };
        let registry = Arc::new(CacheRegistry::<String, String>::new(durable.clone(), settings));
        let users = registry.get_or_create("users").unwrap();
        users.put("u1".into(), "Alice".into()).await.unwrap();
        assert!(durable.is_empty());

        registry.run_maintenance().await;
        assert_eq!(users.pending_len(), 0);
        assert_eq!(durable.len(), 1);
    }

    #[tokio::test]
    async fn test_session_store_is_shared_and_maintained() {
        let durable = Arc::new(MemoryDurableTier::new());
        let settings = CacheSettings {
            flush_interval_ms: 3_600_000,
            ..CacheSettings::default()
        };
        let registry = CacheRegistry::<String, String>::new(durable.clone(), settings);

        let first = registry.session_store(
            &SessionSettings::default(),
            Arc::new(tiercache_api::UuidSessionIdGenerator),
        );
        let second = registry.session_store(
            &SessionSettings::default(),
            Arc::new(tiercache_api::UuidSessionIdGenerator),
        );
        assert!(Arc::ptr_eq(&first, &second));

        let mut session = tiercache_api::Session::new();
        let id = tiercache_api::SessionStore::create(&*first, &mut session)
            .await
            .unwrap();
        assert!(durable.is_empty());

        registry.run_maintenance().await;
        assert_eq!(first.cache().pending_len(), 0);
        assert!(
            durable
                .get(&format!("tiercache:session:{id}"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
