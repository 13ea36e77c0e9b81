//! Key registry: the immutable set of HMAC signing keys.
//!
//! Loaded once at startup and shared read-only. Loading fails fast when the
//! active key does not resolve, so a process never runs half-configured.

use std::collections::BTreeMap;
use std::fmt;

use crate::crypto::SecretKey;
use crate::error::KeyConfigError;

/// A named signing key.
#[derive(Clone)]
pub struct SigningKey {
    pub id: String,
    pub secret: SecretKey,
}

impl SigningKey {
    pub fn new(id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            secret: SecretKey::new(secret),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Unvalidated key configuration.
#[derive(Debug, Clone, Default)]
pub struct KeyConfig {
    pub keys: Vec<SigningKey>,
    pub active_id: String,
}

/// Validated mapping of key ids to secrets plus the active key id.
pub struct KeyRegistry {
    keys: BTreeMap<String, SecretKey>,
    active_id: String,
}

impl KeyRegistry {
    /// Validate a key configuration.
    pub fn load(config: KeyConfig) -> Result<Self, KeyConfigError> {
        if config.keys.is_empty() {
            return Err(KeyConfigError::NoKeys);
        }
        let active_id = config.active_id.trim().to_string();
        if active_id.is_empty() {
            return Err(KeyConfigError::EmptyActiveId);
        }

        let mut keys = BTreeMap::new();
        for (index, key) in config.keys.into_iter().enumerate() {
            if key.id.is_empty() {
                return Err(KeyConfigError::EmptyKeyId(index));
            }
            if key.secret.is_empty() {
                return Err(KeyConfigError::EmptySecret(key.id));
            }
            if keys.contains_key(&key.id) {
                return Err(KeyConfigError::DuplicateKeyId(key.id));
            }
            keys.insert(key.id, key.secret);
        }

        if !keys.contains_key(&active_id) {
            return Err(KeyConfigError::ActiveKeyMissing(active_id));
        }

        Ok(Self { keys, active_id })
    }

    /// Parse a key map of the form `id:secret,id2:secret2`.
    ///
    /// Whitespace around ids and secrets is trimmed and empty segments are
    /// skipped. Secrets may themselves contain `:`.
    pub fn parse(key_map: &str, active_id: &str) -> Result<Self, KeyConfigError> {
        let mut keys = Vec::new();
        for (index, segment) in key_map.split(',').enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (id, secret) = segment
                .split_once(':')
                .ok_or(KeyConfigError::MalformedEntry(index))?;
            let id = id.trim();
            if id.is_empty() {
                return Err(KeyConfigError::EmptyKeyId(index));
            }
            keys.push(SigningKey::new(id, secret.trim().as_bytes().to_vec()));
        }

        Self::load(KeyConfig {
            keys,
            active_id: active_id.to_string(),
        })
    }

    /// The key used for new signatures.
    pub fn active(&self) -> (&str, &SecretKey) {
        // load() guarantees the active id resolves
        let secret = &self.keys[&self.active_id];
        (&self.active_id, secret)
    }

    /// The active key id.
    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    /// Resolve a secret by key id.
    pub fn by_id(&self, id: &str) -> Option<&SecretKey> {
        self.keys.get(id)
    }

    /// All configured key ids, sorted.
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a loaded registry.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("key_ids", &self.keys.keys().collect::<Vec<_>>())
            .field("active_id", &self.active_id)
            .finish()
    }
}
