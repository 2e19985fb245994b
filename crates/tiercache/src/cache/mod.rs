//! Two-tier caching for authentication state.
//!
//! ## Architecture
//!
//! - **L1 (DashMap)**: In-memory, per-instance, expiry from write time
//! - **L2 (Redis)**: Network, shared across instances, native TTL
//! - **Flush gate**: L1 writes reach L2 at periodic boundaries
//!
//! ## Cache Hierarchy
//!
//! ```text
//! get → L1 (DashMap) → L2 (Redis) → None
//!           ↓               ↓
//!       no I/O        backfills L1
//! ```
//!
//! Named caches are obtained from a [`CacheRegistry`]; sessions are kept by a
//! [`TieredSessionStore`] in the reserved `session` namespace.

pub mod codec;
pub mod durable;
pub mod flush;
pub mod local;
pub mod redis;
pub mod registry;
pub mod session;
pub mod tiered;

pub use codec::{CacheKey, KeyCodec, Namespace, SESSION_NAMESPACE};
pub use durable::{DurableError, DurableOpCounts, DurableResult, DurableTier, MemoryDurableTier};
pub use flush::FlushGate;
pub use local::{CacheEntry, LocalTier, LocalTierStats};
pub use self::redis::RedisDurableTier;
pub use registry::CacheRegistry;
pub use session::TieredSessionStore;
pub use tiered::{CacheValue, DurableTtl, TierOptions, TieredCache};
