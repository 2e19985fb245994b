//! Capability traits consumed by the host authentication framework.

use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::types::Session;

/// A named key-value cache.
///
/// Implementations must be thread-safe (`Send + Sync`) and usable behind
/// `Arc<dyn Cache<K, V>>` without external locking.
///
/// # Example
///
/// ```ignore
/// use tiercache_api::{Cache, CacheResult};
///
/// async fn remember_role(cache: &dyn Cache<String, String>, user: &str) -> CacheResult<()> {
///     cache.put(user.to_string(), "admin".to_string()).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Returns the cached value, or `None` if absent.
    async fn get(&self, key: &K) -> CacheResult<Option<V>>;

    /// Stores a value and returns it.
    async fn put(&self, key: K, value: V) -> CacheResult<V>;

    /// Removes a value, returning the previous one if it existed.
    async fn remove(&self, key: &K) -> CacheResult<Option<V>>;

    /// Removes every entry of this cache.
    async fn clear(&self) -> CacheResult<()>;

    /// Number of entries.
    async fn size(&self) -> CacheResult<usize>;

    /// All keys.
    async fn keys(&self) -> CacheResult<HashSet<K>>;

    /// All values.
    async fn values(&self) -> CacheResult<Vec<V>>;
}

/// Persistence for authenticated sessions.
///
/// # Errors
///
/// `create` and `update` fail with `CacheError::MissingIdentity` when the
/// session has (or would get) no id. Infrastructure failures surface as
/// `CacheError::DurableIo`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Assigns a new id to the session, stores it, and returns the id.
    async fn create(&self, session: &mut Session) -> CacheResult<String>;

    /// Reads a session by id. Returns `None` if it does not exist.
    async fn read(&self, id: &str) -> CacheResult<Option<Session>>;

    /// Stores the current state of an existing session.
    async fn update(&self, session: &Session) -> CacheResult<()>;

    /// Deletes a session.
    async fn delete(&self, session: &Session) -> CacheResult<()>;

    /// All sessions currently known to the store.
    async fn active_sessions(&self) -> CacheResult<Vec<Session>>;
}
