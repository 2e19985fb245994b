//! Session identity types shared between the host framework and the stores.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Default session timeout: 30 minutes.
pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// An authenticated session owned by the host framework.
///
/// The stores treat a session as an opaque value keyed by its id. The only
/// field they interpret is `timeout_ms`, which drives durable expiry: a
/// negative timeout means the session never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Option<String>,
    timeout_ms: i64,
    started_at: OffsetDateTime,
    last_accessed_at: OffsetDateTime,
    host: Option<String>,
    attributes: BTreeMap<String, Value>,
}

impl Session {
    /// Creates a session without an id, using the default timeout.
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: None,
            timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            started_at: now,
            last_accessed_at: now,
            host: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the originating host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the timeout in milliseconds. Negative values disable expiry.
    pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the session id directly (for sessions restored by the framework).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assigns a freshly generated id.
    pub fn assign_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    pub fn set_timeout_ms(&mut self, timeout_ms: i64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn last_accessed_at(&self) -> OffsetDateTime {
        self.last_accessed_at
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Marks the session as accessed now.
    pub fn touch(&mut self) {
        self.last_accessed_at = OffsetDateTime::now_utc();
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Returns `true` if the session has been idle longer than its timeout.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        if self.timeout_ms < 0 {
            return false;
        }
        now - self.last_accessed_at > time::Duration::milliseconds(self.timeout_ms)
    }

    /// Time-to-live for the durable copy of this session.
    ///
    /// Returns `None` for a negative timeout (stored without expiry). The
    /// durable tier counts in whole seconds, so positive timeouts are rounded
    /// up and never drop below one second.
    pub fn durable_ttl(&self) -> Option<Duration> {
        if self.timeout_ms < 0 {
            return None;
        }
        let secs = (self.timeout_ms as u64).div_ceil(1000).max(1);
        Some(Duration::from_secs(secs))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces identifiers for newly created sessions.
pub trait SessionIdGenerator: Send + Sync {
    fn generate(&self, session: &Session) -> String;
}

/// Random UUID v4 session ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidSessionIdGenerator;

impl SessionIdGenerator for UuidSessionIdGenerator {
    fn generate(&self, _session: &Session) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
