//! Shared (L2) tier contract and the process-local implementation.
//!
//! [`DurableTier`] is the narrow client surface the tiered caches need from a
//! shared key-value store: byte values, optional expiry in seconds, deletes,
//! and glob-pattern key enumeration. [`RedisDurableTier`](super::redis::RedisDurableTier)
//! is the production client; [`MemoryDurableTier`] keeps everything in this
//! process and is used for single-instance deployments and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tiercache_api::CacheError;

use crate::clock::{Clock, MonotonicClock};

/// Errors raised by a durable tier client.
#[derive(Debug, thiserror::Error)]
pub enum DurableError {
    /// No connection could be checked out of the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// The store rejected or failed a command.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store cannot be reached.
    #[error("durable tier unavailable: {message}")]
    Unavailable { message: String },
}

impl DurableError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

impl From<DurableError> for CacheError {
    fn from(err: DurableError) -> Self {
        let message = err.to_string();
        CacheError::durable_io(message, err)
    }
}

pub type DurableResult<T> = Result<T, DurableError>;

/// Client for the shared key-value store.
///
/// Patterns are glob-style (`*`, `?`, `[...]`, `\` escapes) and in practice
/// always end in a trailing `*`.
#[async_trait]
pub trait DurableTier: Send + Sync {
    async fn get(&self, key: &str) -> DurableResult<Option<Vec<u8>>>;

    /// Stores a value without expiry.
    async fn set(&self, key: &str, value: &[u8]) -> DurableResult<()>;

    /// Stores a value that expires after `ttl_secs` seconds.
    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> DurableResult<()>;

    async fn delete(&self, key: &str) -> DurableResult<()>;

    async fn delete_many(&self, keys: &[String]) -> DurableResult<()>;

    /// All keys matching `pattern` in a single blocking command.
    async fn keys(&self, pattern: &str) -> DurableResult<Vec<String>>;

    /// All keys matching `pattern`, enumerated incrementally.
    ///
    /// Preferred over [`keys`](Self::keys) for large namespaces.
    async fn scan(&self, pattern: &str) -> DurableResult<Vec<String>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> DurableResult<()>;
}

/// Converts a TTL to the whole seconds the store understands, rounding up.
pub fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Glob match supporting `*`, `?`, `[...]` and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_at(&pattern, &text)
}

fn glob_match_at(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => (0..=text.len()).any(|skip| glob_match_at(&pattern[1..], &text[skip..])),
        Some('?') => !text.is_empty() && glob_match_at(&pattern[1..], &text[1..]),
        Some('\\') if pattern.len() > 1 => {
            text.first() == Some(&pattern[1]) && glob_match_at(&pattern[2..], &text[1..])
        }
        Some('[') => {
            let Some(close) = pattern.iter().position(|c| *c == ']') else {
                return text.first() == Some(&'[') && glob_match_at(&pattern[1..], &text[1..]);
            };
            let Some(c) = text.first() else {
                return false;
            };
            pattern[1..close].contains(c) && glob_match_at(&pattern[close + 1..], &text[1..])
        }
        Some(p) => text.first() == Some(p) && glob_match_at(&pattern[1..], &text[1..]),
    }
}

struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<u64>,
}

/// Counts of operations served by a [`MemoryDurableTier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurableOpCounts {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub scans: u64,
}

impl DurableOpCounts {
    pub fn total(&self) -> u64 {
        self.gets + self.sets + self.deletes + self.scans
    }
}

#[derive(Default)]
struct OpCounters {
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
}

/// Durable tier held in this process.
///
/// Shared across every cache of a registry, so it behaves like a single
/// store that outlives any one cache's local tier. Expiry follows the given
/// clock. [`set_available`](Self::set_available) simulates an outage.
pub struct MemoryDurableTier {
    entries: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    ops: OpCounters,
}

impl MemoryDurableTier {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            available: AtomicBool::new(true),
            ops: OpCounters::default(),
        }
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn op_counts(&self) -> DurableOpCounts {
        DurableOpCounts {
            gets: self.ops.gets.load(Ordering::SeqCst),
            sets: self.ops.sets.load(Ordering::SeqCst),
            deletes: self.ops.deletes.load(Ordering::SeqCst),
            scans: self.ops.scans.load(Ordering::SeqCst),
        }
    }

    /// Remaining time-to-live of `key`; `Some(None)` means no expiry.
    pub fn ttl_of(&self, key: &str) -> Option<Option<Duration>> {
        let now = self.clock.now_millis();
        let entry = self.entries.get(key)?;
        match entry.expires_at {
            None => Some(None),
            Some(at) if at > now => Some(Some(Duration::from_millis(at - now))),
            Some(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> DurableResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DurableError::unavailable("in-memory store switched off"))
        }
    }

    fn matching(&self, pattern: &str) -> Vec<String> {
        let now = self.clock.now_millis();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at.is_none_or(|at| at > now))
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn store(&self, key: &str, value: &[u8], expires_at: Option<u64>) {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                data: value.to_vec(),
                expires_at,
            },
        );
    }
}

impl Default for MemoryDurableTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableTier for MemoryDurableTier {
    async fn get(&self, key: &str) -> DurableResult<Option<Vec<u8>>> {
        self.ops.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let now = self.clock.now_millis();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at.is_none_or(|at| at > now) => {
                return Ok(Some(entry.data.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at.is_some_and(|at| at <= now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8]) -> DurableResult<()> {
        self.ops.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.store(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> DurableResult<()> {
        self.ops.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let expires_at = self.clock.now_millis() + ttl_secs * 1000;
        self.store(key, value, Some(expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> DurableResult<()> {
        self.ops.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> DurableResult<()> {
        self.ops.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> DurableResult<Vec<String>> {
        self.ops.scans.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.matching(pattern))
    }

    async fn scan(&self, pattern: &str) -> DurableResult<Vec<String>> {
        self.ops.scans.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.matching(pattern))
    }

    async fn ping(&self) -> DurableResult<()> {
        self.check_available()
    }
}
