//! Error types for evalseal core.

use thiserror::Error;

/// Core errors that can occur while hashing, encoding, or signing.
///
/// These indicate programmer errors (a value that cannot be canonicalized,
/// key material the MAC rejects), never a verification mismatch.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("invalid key material for key {0}")]
    InvalidKey(String),
}

/// Errors raised while loading the key registry.
///
/// These are fatal at startup. Messages name key ids only, never secrets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyConfigError {
    #[error("no signing keys configured")]
    NoKeys,

    #[error("active key id is empty")]
    EmptyActiveId,

    #[error("active key {0:?} is not present in the key set")]
    ActiveKeyMissing(String),

    #[error("key entry {0} has an empty id")]
    EmptyKeyId(usize),

    #[error("key {0:?} has an empty secret")]
    EmptySecret(String),

    #[error("key {0:?} is defined more than once")]
    DuplicateKeyId(String),

    #[error("key entry {0} is not of the form id:secret")]
    MalformedEntry(usize),
}

/// Request freshness failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FreshnessError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("max_age_ms {requested} exceeds allowed limit {ceiling}")]
    ConfigExceeded { requested: i64, ceiling: i64 },

    #[error("invalid RFC 3339 timestamp: {0}")]
    InvalidFormat(String),

    #[error("timestamp is {ahead_ms}ms in the future (drift limit {drift_ms}ms)")]
    FutureTimestamp { ahead_ms: i64, drift_ms: i64 },

    #[error("request expired: age {age_ms}ms exceeds max_age_ms {max_age_ms}")]
    Expired { age_ms: i64, max_age_ms: i64 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
