//! # tiercache-api
//!
//! Capability traits and types through which an authentication framework
//! consumes caches and session persistence.
//!
//! This crate does not contain any implementations. The tiered
//! (local + durable) implementations live in the `tiercache` crate.
//!
//! ## Overview
//!
//! - [`Cache`]: named key-value cache (`get`, `put`, `remove`, `clear`,
//!   `size`, `keys`, `values`)
//! - [`SessionStore`]: session persistence (`create`, `read`, `update`,
//!   `delete`, `active_sessions`)
//! - [`Session`]: the session value, with its own timeout
//! - [`CacheError`]: the single error type for both capabilities

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CacheError, CacheResult};
pub use traits::{Cache, SessionStore};
pub use types::{DEFAULT_SESSION_TIMEOUT_MS, Session, SessionIdGenerator, UuidSessionIdGenerator};
