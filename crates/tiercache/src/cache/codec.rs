//! Durable-tier key layout.
//!
//! ## Key Format
//!
//! - Cache entries: `{root}:{cache_name}:{encoded_key}`, e.g. `tiercache:users:u1`
//! - Sessions: `{root}:session:{session_id}`
//!
//! Scalar keys (strings, integers, booleans, chars) are written in their
//! textual form. Any other key is serialized to MessagePack and written as
//! `~v1~` followed by unpadded URL-safe base64, so the durable key is always
//! valid text.
//!
//! ## Known Limitation
//!
//! Keys of different types that render to the same text share a durable key:
//! the string `"42"` and the integer `42` both encode to `{prefix}42`. A cache
//! is typed by its key, so this only matters when two processes use one cache
//! name with different key types.

use std::hash::Hash;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tiercache_api::{CacheError, CacheResult};

/// Cache name reserved for the session space.
pub const SESSION_NAMESPACE: &str = "session";

/// Version tag in front of encoded composite keys.
const COMPOSITE_MARKER: &str = "~v1~";

/// Key prefix isolating one named cache (or the session space).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: String,
    prefix: String,
}

impl Namespace {
    /// Namespace of a named cache.
    ///
    /// Names containing `:` or equal to `session` are rejected: both would let
    /// one namespace's prefix be a prefix of another's.
    pub fn cache(root: &str, name: &str) -> CacheResult<Self> {
        if root.is_empty() {
            return Err(CacheError::invalid_name(name, "key prefix root is empty"));
        }
        if name.is_empty() {
            return Err(CacheError::invalid_name(name, "cache name is empty"));
        }
        if name.contains(':') {
            return Err(CacheError::invalid_name(name, "cache name must not contain ':'"));
        }
        if name == SESSION_NAMESPACE {
            return Err(CacheError::invalid_name(
                name,
                "cache name is reserved for sessions",
            ));
        }
        Ok(Self {
            name: name.to_string(),
            prefix: format!("{root}:{name}:"),
        })
    }

    /// Namespace of the session space.
    pub fn session(root: &str) -> Self {
        Self {
            name: SESSION_NAMESPACE.to_string(),
            prefix: format!("{root}:{SESSION_NAMESPACE}:"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Glob pattern matching every durable key of this namespace.
    pub fn pattern(&self) -> String {
        let mut pattern = escape_glob(&self.prefix);
        pattern.push('*');
        pattern
    }

    /// Removes the namespace prefix from a durable key.
    pub fn strip<'a>(&self, durable_key: &'a str) -> Option<&'a str> {
        durable_key.strip_prefix(self.prefix.as_str())
    }
}

fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A key that can address the durable tier.
///
/// Scalar types override [`scalar_text`](CacheKey::scalar_text) and
/// [`from_scalar_text`](CacheKey::from_scalar_text). Composite keys keep the
/// defaults and are encoded from their serde form:
///
/// ```ignore
/// #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// struct Grant { subject: String, scope: String }
///
/// impl CacheKey for Grant {}
/// ```
pub trait CacheKey: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static {
    /// Human-readable form for scalar keys, `None` for composite keys.
    fn scalar_text(&self) -> Option<String> {
        None
    }

    /// Parses the human-readable form back into a key.
    fn from_scalar_text(_text: &str) -> Option<Self> {
        None
    }
}

macro_rules! scalar_cache_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CacheKey for $ty {
                fn scalar_text(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn from_scalar_text(text: &str) -> Option<Self> {
                    text.parse().ok()
                }
            }
        )*
    };
}

scalar_cache_key!(
    String, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize,
);

/// Encodes keys of one namespace into durable keys and back.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    namespace: Namespace,
}

impl KeyCodec {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Durable key for `key`. Deterministic for a given key value.
    pub fn encode<K: CacheKey>(&self, key: &K) -> CacheResult<String> {
        let prefix = self.namespace.prefix();
        match key.scalar_text() {
            Some(text) => Ok(format!("{prefix}{text}")),
            None => {
                let bytes = rmp_serde::to_vec(key)
                    .map_err(|e| CacheError::invalid_key(format!("cannot serialize key: {e}")))?;
                Ok(format!(
                    "{prefix}{COMPOSITE_MARKER}{}",
                    URL_SAFE_NO_PAD.encode(bytes)
                ))
            }
        }
    }

    /// Recovers the key from a durable key of this namespace.
    ///
    /// Returns `None` for keys outside the namespace or not produced by
    /// [`encode`](Self::encode) for `K`.
    pub fn decode<K: CacheKey>(&self, durable_key: &str) -> Option<K> {
        let rest = self.namespace.strip(durable_key)?;
        if let Some(key) = K::from_scalar_text(rest) {
            return Some(key);
        }
        let encoded = rest.strip_prefix(COMPOSITE_MARKER)?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        rmp_serde::from_slice(&bytes).ok()
    }
}
