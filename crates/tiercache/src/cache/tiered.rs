//! Two-tier cache: local (L1) in front of the shared durable tier (L2).
//!
//! ## Read Path
//!
//! ```text
//! get(k) → L1 hit ──────────────→ value        (no I/O)
//!        → L1 miss → L2 hit ────→ backfill L1 → value
//!                  → L2 miss ───→ None         (absence is not cached)
//! ```
//!
//! ## Write Path
//!
//! `put` always lands in L1 and marks the key pending. Pending keys reach L2
//! only when a flush runs: on the first `put` after a flush boundary, on an
//! explicit [`TieredCache::flush`], or from the registry's maintenance task.
//! This bounds write load on the shared store.
//!
//! **Loss window**: a value written since the last boundary exists only in
//! this process. If the process exits, or the L1 entry expires or is
//! invalidated before the next flush, the value never reaches L2. Other
//! instances cannot see it until it has been flushed.
//!
//! `remove` and `clear` are never deferred: they hit both tiers immediately.
//! A key being written by a flush is tracked as in flight; a `remove` or
//! `clear` that lands during that write marks it, and the flush deletes the
//! durable key again once its SET has completed. A flush skips keys another
//! flush is still writing, leaving them pending for the next one.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tiercache_api::{Cache, CacheError, CacheResult};

use super::codec::{CacheKey, KeyCodec, Namespace};
use super::durable::{DurableTier, ttl_secs};
use super::flush::FlushGate;
use super::local::{LocalTier, LocalTierStats};
use crate::clock::Clock;
use crate::metrics;

/// Tuning shared by every tiered cache of a registry.
#[derive(Debug, Clone, Copy)]
pub struct TierOptions {
    /// Entry time-to-live, applied to both tiers.
    pub timeout: Duration,
    /// Spacing of flush boundaries. Zero writes through on every `put`.
    pub flush_interval: Duration,
    /// Local tier capacity ceiling.
    pub max_entries: usize,
}

/// Expiry of a value once it reaches the durable tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableTtl {
    Expire(Duration),
    Persist,
}

/// Values storable in a tiered cache.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// One named cache spanning the local and durable tiers.
pub struct TieredCache<K, V> {
    codec: KeyCodec,
    local: LocalTier<K, V>,
    durable: Arc<dyn DurableTier>,
    gate: FlushGate,
    pending: DashMap<K, DurableTtl>,
    /// Keys a flush is writing; `true` once removed during the write.
    in_flight: DashMap<K, bool>,
    timeout: Duration,
}

impl<K: CacheKey, V: CacheValue> TieredCache<K, V> {
    pub fn new(
        namespace: Namespace,
        durable: Arc<dyn DurableTier>,
        clock: Arc<dyn Clock>,
        options: TierOptions,
    ) -> Self {
        tracing::trace!(prefix = %namespace.prefix(), "creating tiered cache");
        Self {
            codec: KeyCodec::new(namespace),
            local: LocalTier::new(options.timeout, options.max_entries, Arc::clone(&clock)),
            durable,
            gate: FlushGate::new(options.flush_interval, clock),
            pending: DashMap::new(),
            in_flight: DashMap::new(),
            timeout: options.timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.codec.namespace().name()
    }

    pub fn namespace(&self) -> &Namespace {
        self.codec.namespace()
    }

    /// The local tier, for inspection and tests.
    pub fn local(&self) -> &LocalTier<K, V> {
        &self.local
    }

    pub fn stats(&self) -> LocalTierStats {
        self.local.stats()
    }

    /// Number of writes not yet pushed to the durable tier.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Durable key under which `key` is stored.
    pub fn durable_key(&self, key: &K) -> CacheResult<String> {
        self.codec.encode(key)
    }

    pub async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        if let Some(value) = self.local.get(key) {
            tracing::debug!(cache = %self.name(), "cache hit (L1)");
            metrics::record_cache_hit(self.name(), "L1");
            return Ok(Some(value));
        }

        let durable_key = self.codec.encode(key)?;
        let Some(bytes) = self.durable.get(&durable_key).await? else {
            tracing::debug!(cache = %self.name(), key = %durable_key, "cache miss");
            metrics::record_cache_miss(self.name());
            return Ok(None);
        };

        let value: V = decode_value(&durable_key, &bytes)?;
        tracing::debug!(cache = %self.name(), key = %durable_key, "cache hit (L2)");
        metrics::record_cache_hit(self.name(), "L2");
        self.local.put(key.clone(), value.clone());
        Ok(Some(value))
    }

    /// Stores `value` locally; pushes pending writes if a boundary was reached.
    pub async fn put(&self, key: K, value: V) -> CacheResult<V> {
        self.put_with_ttl(key, value, DurableTtl::Expire(self.timeout))
            .await
    }

    pub(crate) async fn put_with_ttl(&self, key: K, value: V, ttl: DurableTtl) -> CacheResult<V> {
        self.local.put(key.clone(), value.clone());
        self.pending.insert(key, ttl);

        if self.gate.try_cross() {
            self.flush().await?;
        }
        Ok(value)
    }

    /// Pushes every pending write to the durable tier.
    ///
    /// Each key is written with its current local value. Keys whose local
    /// entry is gone are dropped. Keys still being written by a concurrent
    /// flush stay pending. On failure the unwritten keys stay pending and the
    /// error is returned.
    pub async fn flush(&self) -> CacheResult<usize> {
        let keys: Vec<K> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let mut claimed = Vec::with_capacity(keys.len());
        for key in keys {
            let Entry::Vacant(slot) = self.in_flight.entry(key.clone()) else {
                continue;
            };
            if let Some((key, ttl)) = self.pending.remove(&key) {
                slot.insert(false);
                claimed.push((key, ttl));
            }
        }

        let mut written = 0;
        let mut dropped = 0;
        let mut batch = claimed.into_iter();
        while let Some((key, ttl)) = batch.next() {
            match self.write_claimed(&key, ttl).await {
                Ok(true) => written += 1,
                Ok(false) => dropped += 1,
                Err(e) => {
                    self.pending.entry(key).or_insert(ttl);
                    for (key, ttl) in batch.by_ref() {
                        self.in_flight.remove(&key);
                        self.pending.entry(key).or_insert(ttl);
                    }
                    tracing::debug!(cache = %self.name(), error = %e, "flush aborted");
                    return Err(e);
                }
            }
        }

        if dropped > 0 {
            tracing::debug!(cache = %self.name(), dropped, "pending writes lost before flush");
        }
        tracing::debug!(cache = %self.name(), written, "flushed to durable tier");
        metrics::record_flush(self.name(), written);
        Ok(written)
    }

    /// Writes one claimed key and releases its in-flight mark.
    ///
    /// Returns `false` when nothing durable remains: the local entry was gone,
    /// or the key was removed while the write was in flight.
    async fn write_claimed(&self, key: &K, ttl: DurableTtl) -> CacheResult<bool> {
        let Some(value) = self.local.peek(key) else {
            self.in_flight.remove(key);
            return Ok(false);
        };

        let written = self.write_durable(key, &value, ttl).await;
        let removed = self
            .in_flight
            .remove(key)
            .is_some_and(|(_, removed)| removed);
        if removed {
            // The SET may have landed after the remove's DEL.
            let durable_key = self.codec.encode(key)?;
            self.durable.delete(&durable_key).await?;
            tracing::debug!(cache = %self.name(), key = %durable_key, "write removed during flush");
            return written.map(|()| false);
        }
        written.map(|()| true)
    }

    async fn write_durable(&self, key: &K, value: &V, ttl: DurableTtl) -> CacheResult<()> {
        let durable_key = self.codec.encode(key)?;
        let bytes = rmp_serde::to_vec(value).map_err(|e| {
            CacheError::serialization(format!("cannot serialize value for {durable_key}: {e}"))
        })?;
        match ttl {
            DurableTtl::Expire(ttl) => {
                self.durable
                    .set_ex(&durable_key, &bytes, ttl_secs(ttl))
                    .await?
            }
            DurableTtl::Persist => self.durable.set(&durable_key, &bytes).await?,
        }
        Ok(())
    }

    /// Removes `key` from both tiers and returns the previous value.
    ///
    /// The previous value comes from L1 when present; otherwise it is read
    /// from L2 before the delete.
    pub async fn remove(&self, key: &K) -> CacheResult<Option<V>> {
        self.pending.remove(key);
        let local_previous = self.local.invalidate(key);
        if let Some(mut removed) = self.in_flight.get_mut(key) {
            *removed = true;
        }

        let durable_key = self.codec.encode(key)?;
        let durable_previous = match local_previous {
            Some(_) => None,
            None => self.durable.get(&durable_key).await?,
        };
        self.durable.delete(&durable_key).await?;
        tracing::debug!(cache = %self.name(), key = %durable_key, "cache entry removed (L1+L2)");

        if local_previous.is_some() {
            return Ok(local_previous);
        }
        Ok(durable_previous.and_then(|bytes| match decode_value(&durable_key, &bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %durable_key, error = %e, "removed entry was undecodable");
                None
            }
        }))
    }

    /// Empties L1 and deletes every durable key of this namespace.
    pub async fn clear(&self) -> CacheResult<()> {
        self.local.invalidate_all();
        self.pending.clear();
        self.in_flight.iter_mut().for_each(|mut entry| *entry.value_mut() = true);

        let keys: Vec<String> = self
            .durable
            .scan(&self.namespace().pattern())
            .await?
            .into_iter()
            .filter(|key| self.namespace().strip(key).is_some())
            .collect();
        if !keys.is_empty() {
            self.durable.delete_many(&keys).await?;
        }
        tracing::debug!(cache = %self.name(), deleted = keys.len(), "cache cleared (L1+L2)");
        Ok(())
    }

    /// Live L1 entry count, or the number of decodable durable keys when L1
    /// is empty. Agrees with [`keys`](Self::keys).
    pub async fn size(&self) -> CacheResult<usize> {
        let local = self.local.size();
        if local > 0 {
            return Ok(local);
        }
        Ok(self.durable_entries().await?.len())
    }

    pub async fn keys(&self) -> CacheResult<HashSet<K>> {
        let local = self.local.keys();
        if !local.is_empty() {
            return Ok(local.into_iter().collect());
        }

        Ok(self
            .durable_entries()
            .await?
            .into_iter()
            .map(|(_, key)| key)
            .collect())
    }

    pub async fn values(&self) -> CacheResult<Vec<V>> {
        let local = self.local.values();
        if !local.is_empty() {
            return Ok(local);
        }

        let mut values = Vec::new();
        for (durable_key, _) in self.durable_entries().await? {
            // Entries may expire between the scan and the read.
            if let Some(bytes) = self.durable.get(&durable_key).await? {
                values.push(decode_value(&durable_key, &bytes)?);
            }
        }
        Ok(values)
    }

    /// Durable keys of this namespace paired with their decoded cache key.
    /// Keys that do not decode as `K` are skipped.
    async fn durable_entries(&self) -> CacheResult<Vec<(String, K)>> {
        let mut entries = Vec::new();
        for durable_key in self.durable.scan(&self.namespace().pattern()).await? {
            match self.codec.decode::<K>(&durable_key) {
                Some(key) => entries.push((durable_key, key)),
                None => {
                    tracing::warn!(key = %durable_key, "skipping undecodable durable key");
                }
            }
        }
        Ok(entries)
    }

    /// Drops expired L1 entries and publishes the live entry gauge.
    pub fn purge_expired(&self) -> usize {
        let removed = self.local.purge_expired();
        metrics::set_cache_entries(self.name(), self.local.size());
        removed
    }
}

fn decode_value<V: DeserializeOwned>(durable_key: &str, bytes: &[u8]) -> CacheResult<V> {
    rmp_serde::from_slice(bytes).map_err(|e| {
        CacheError::serialization(format!("cannot deserialize value of {durable_key}: {e}"))
    })
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> Cache<K, V> for TieredCache<K, V> {
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        TieredCache::get(self, key).await
    }

    async fn put(&self, key: K, value: V) -> CacheResult<V> {
        TieredCache::put(self, key, value).await
    }

    async fn remove(&self, key: &K) -> CacheResult<Option<V>> {
        TieredCache::remove(self, key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        TieredCache::clear(self).await
    }

    async fn size(&self) -> CacheResult<usize> {
        TieredCache::size(self).await
    }

    async fn keys(&self) -> CacheResult<HashSet<K>> {
        TieredCache::keys(self).await
    }

    async fn values(&self) -> CacheResult<Vec<V>> {
        TieredCache::values(self).await
    }
}
