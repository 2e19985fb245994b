//! # tiercache
//!
//! Two-tier cache and session persistence for authentication frameworks:
//! a fast in-process tier in front of a shared Redis tier.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiercache::{CacheRegistry, config::loader, connect_durable_tier};
//! use tiercache_api::UuidSessionIdGenerator;
//!
//! let config = loader::load_config(None)?;
//! let durable = connect_durable_tier(&config.redis).await?;
//! let registry = Arc::new(CacheRegistry::<String, String>::new(durable, config.cache.clone()));
//! registry.clone().spawn_maintenance(config.cache.maintenance_interval());
//!
//! let users = registry.get_or_create("users")?;
//! users.put("u1".into(), "Alice".into()).await?;
//!
//! let sessions = registry.session_store(&config.session, Arc::new(UuidSessionIdGenerator));
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use tiercache_api::{CacheError, CacheResult};

pub use cache::{
    CacheKey, CacheRegistry, DurableError, DurableTier, DurableTtl, KeyCodec, LocalTier,
    MemoryDurableTier, Namespace, RedisDurableTier, TierOptions, TieredCache, TieredSessionStore,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{CacheSettings, RedisConfig, SessionSettings, TierConfig};

/// Create the durable tier based on configuration.
///
/// ## Modes
///
/// - **Redis disabled**: Returns an in-process store. Caches still work, but
///   nothing is shared between instances.
/// - **Redis enabled**: Builds a connection pool and checks out one
///   connection to verify the server is reachable.
///
/// # Errors
///
/// Returns `CacheError::DurableIo` if the pool cannot be built or Redis
/// cannot be reached. There is no silent fallback once Redis is enabled.
pub async fn connect_durable_tier(config: &RedisConfig) -> CacheResult<Arc<dyn DurableTier>> {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process durable tier");
        return Ok(Arc::new(MemoryDurableTier::new()));
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.create = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.recycle = Some(Duration::from_millis(config.timeout_ms));
    redis_config.pool = Some(pool_config);

    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| CacheError::durable_io("failed to create Redis pool", e))?;

    let tier = RedisDurableTier::new(pool);
    tier.ping().await?;
    tracing::info!("Connected to Redis");

    Ok(Arc::new(tier))
}
