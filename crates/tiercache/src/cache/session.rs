//! Tiered session persistence.
//!
//! Sessions live under `{root}:session:{session_id}` and follow the same
//! read, write and delete policy as [`TieredCache`]. The durable copy expires
//! with the session's own timeout; a negative timeout stores it without
//! expiry. The local copy uses the store-wide local timeout.

use std::sync::Arc;

use async_trait::async_trait;
use tiercache_api::{CacheError, CacheResult, Session, SessionIdGenerator, SessionStore};

use super::codec::Namespace;
use super::durable::DurableTier;
use super::tiered::{DurableTtl, TierOptions, TieredCache};
use crate::clock::Clock;

pub struct TieredSessionStore {
    sessions: TieredCache<String, Session>,
    id_generator: Arc<dyn SessionIdGenerator>,
}

impl TieredSessionStore {
    pub fn new(
        root: &str,
        durable: Arc<dyn DurableTier>,
        clock: Arc<dyn Clock>,
        options: TierOptions,
        id_generator: Arc<dyn SessionIdGenerator>,
    ) -> Self {
        Self {
            sessions: TieredCache::new(Namespace::session(root), durable, clock, options),
            id_generator,
        }
    }

    /// The underlying cache, for flushing and inspection.
    pub fn cache(&self) -> &TieredCache<String, Session> {
        &self.sessions
    }

    async fn save(&self, session: &Session) -> CacheResult<()> {
        let Some(id) = session.id() else {
            return Err(CacheError::missing_identity("session id is absent"));
        };
        if id.is_empty() {
            return Err(CacheError::missing_identity("session id is empty"));
        }

        let ttl = match session.durable_ttl() {
            Some(ttl) => DurableTtl::Expire(ttl),
            None => DurableTtl::Persist,
        };
        self.sessions
            .put_with_ttl(id.to_string(), session.clone(), ttl)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for TieredSessionStore {
    async fn create(&self, session: &mut Session) -> CacheResult<String> {
        let id = self.id_generator.generate(session);
        session.assign_id(id.clone());
        self.save(session).await?;
        tracing::debug!(session_id = %id, "session created");
        Ok(id)
    }

    async fn read(&self, id: &str) -> CacheResult<Option<Session>> {
        if id.is_empty() {
            return Ok(None);
        }
        self.sessions.get(&id.to_string()).await
    }

    async fn update(&self, session: &Session) -> CacheResult<()> {
        self.save(session).await
    }

    async fn delete(&self, session: &Session) -> CacheResult<()> {
        let Some(id) = session.id() else {
            tracing::error!("session or session id is absent, nothing to delete");
            return Ok(());
        };
        self.sessions.remove(&id.to_string()).await?;
        tracing::debug!(session_id = %id, "session deleted");
        Ok(())
    }

    async fn active_sessions(&self) -> CacheResult<Vec<Session>> {
        self.sessions.values().await
    }
}
