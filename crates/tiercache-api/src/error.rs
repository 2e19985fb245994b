//! Cache error types.
//!
//! Every operation exposed through [`Cache`](crate::Cache) and
//! [`SessionStore`](crate::SessionStore) fails with a [`CacheError`]. A missing
//! entry is never an error: lookups return `Ok(None)` instead.

/// Errors that can occur during cache and session-store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The durable (shared) tier failed: network, pool, or protocol error.
    #[error("Durable tier error: {message}")]
    DurableIo {
        /// Description of the failed durable operation.
        message: String,
        /// The underlying client error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A session or its identifier was absent where one is required.
    #[error("Missing identity: {message}")]
    MissingIdentity {
        /// Description of what was missing.
        message: String,
    },

    /// A value or key could not be converted to or from its stored form.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A cache name cannot be turned into an isolated namespace.
    #[error("Invalid cache name '{name}': {reason}")]
    InvalidName {
        /// The rejected cache name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// Configuration could not be read or failed validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// A key could not be encoded for the durable tier.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `DurableIo` error wrapping the client error.
    #[must_use]
    pub fn durable_io(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DurableIo {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a new `MissingIdentity` error.
    #[must_use]
    pub fn missing_identity(message: impl Into<String>) -> Self {
        Self::MissingIdentity {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidName` error.
    #[must_use]
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `Config` error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the error originated in the durable tier.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::DurableIo { .. })
    }

    /// Returns `true` if the error is a missing session identity.
    #[must_use]
    pub fn is_missing_identity(&self) -> bool {
        matches!(self, Self::MissingIdentity { .. })
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
