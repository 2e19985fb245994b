use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiercache_api::{CacheError, CacheResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TierConfig {
    /// Redis (durable tier) configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Named cache configuration
    #[serde(default)]
    pub cache: CacheSettings,
    /// Session store configuration
    #[serde(default)]
    pub session: SessionSettings,
}

impl TierConfig {
    pub fn validate(&self) -> CacheResult<()> {
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err(CacheError::config("redis.url must not be empty when redis is enabled"));
            }
            if self.redis.pool_size == 0 {
                return Err(CacheError::config("redis.pool_size must be > 0"));
            }
        }
        let prefix = &self.cache.key_prefix;
        if prefix.is_empty() {
            return Err(CacheError::config("cache.key_prefix must not be empty"));
        }
        if prefix.contains(['*', '?', '[', ']', '\\']) {
            return Err(CacheError::config("cache.key_prefix must not contain glob characters"));
        }
        if self.cache.timeout_ms == 0 {
            return Err(CacheError::config("cache.timeout_ms must be > 0"));
        }
        if self.cache.local_max_entries == 0 {
            return Err(CacheError::config("cache.local_max_entries must be > 0"));
        }
        if self.cache.maintenance_interval_ms == 0 {
            return Err(CacheError::config("cache.maintenance_interval_ms must be > 0"));
        }
        if self.session.local_timeout_ms == 0 {
            return Err(CacheError::config("session.local_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Redis configuration for the shared durable tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use Redis as the durable tier. When disabled, an in-process store
    /// stands in (single-instance deployments).
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Named cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Root of every durable key (`{key_prefix}:{cache_name}:{key}`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Entry time-to-live in milliseconds, for both tiers
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,

    /// Spacing of durable flush boundaries in milliseconds (0 = write-through)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Local (L1) cache max entries
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: usize,

    /// Background flush/purge period in milliseconds
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
}

fn default_key_prefix() -> String {
    "tiercache".to_string()
}

fn default_cache_timeout_ms() -> u64 {
    30 * 60 * 1000 // 30 minutes
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_local_max_entries() -> usize {
    100_000_000
}

fn default_maintenance_interval_ms() -> u64 {
    30_000
}

impl CacheSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            timeout_ms: default_cache_timeout_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            local_max_entries: default_local_max_entries(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Local (L1) lifetime of a session in milliseconds. The durable copy
    /// follows each session's own timeout instead.
    #[serde(default = "default_session_local_timeout_ms")]
    pub local_timeout_ms: u64,
}

fn default_session_local_timeout_ms() -> u64 {
    30 * 60 * 1000
}

impl SessionSettings {
    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            local_timeout_ms: default_session_local_timeout_ms(),
        }
    }
}

/// Layered loading: optional TOML file, then `TIERCACHE__*` environment
/// overrides (e.g. `TIERCACHE__REDIS__URL=redis://cache:6379`).
pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File};
    use tiercache_api::{CacheError, CacheResult};

    use super::TierConfig;

    /// Read when no explicit path is given, if present.
    pub const DEFAULT_CONFIG_FILE: &str = "tiercache.toml";

    pub const ENV_PREFIX: &str = "TIERCACHE";

    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Config` if an explicit `path` does not exist, the
    /// sources cannot be parsed, or the merged values fail validation.
    pub fn load_config(path: Option<&Path>) -> CacheResult<TierConfig> {
        let file = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let mut builder = Config::builder();
        if file.exists() {
            tracing::debug!(path = %file.display(), "loading cache configuration");
            builder = builder.add_source(File::from(file));
        } else if path.is_some() {
            return Err(CacheError::config(format!(
                "configuration file {} not found",
                file.display()
            )));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let merged: TierConfig = builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| CacheError::config(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}
