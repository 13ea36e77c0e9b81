//! Error types for the engine.

use evalseal_core::{CoreError, EntryId, FreshnessError};
use evalseal_store::StoreError;
use thiserror::Error;

/// Errors raised while parsing an evaluation input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("input must be an object")]
    NotAnObject,

    #[error("missing input field: {0}")]
    MissingField(&'static str),

    #[error("input field {0} must be a number")]
    NotANumber(&'static str),

    #[error("input field {field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Timestamp or max-age rejected.
    #[error("freshness check failed: {0}")]
    Freshness(#[from] FreshnessError),

    /// Evaluation input rejected.
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    /// Malformed or missing request field.
    #[error("validation error: {0}")]
    Validation(String),

    /// Nonce failed static checks; the store was not touched.
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Nonce already admitted and not yet expired.
    #[error("replay detected")]
    ReplayDetected,

    /// Client exceeded its window budget.
    #[error("rate limit exceeded: {count} requests in window (max {max})")]
    RateLimited { count: u64, max: u64 },

    /// The store did not answer within the configured timeout.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Appends kept losing the tail race.
    #[error("audit chain contention: gave up after {attempts} attempts")]
    ChainContention { attempts: u32 },

    /// Audit entry not found.
    #[error("audit entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Hashing or signing failed.
    #[error("internal error: {0}")]
    Core(#[from] CoreError),
}

/// Coarse classification used to map errors onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Replay,
    RateLimited,
    NotFound,
    Unavailable,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Freshness(_)
            | EngineError::Input(_)
            | EngineError::Validation(_)
            | EngineError::InvalidNonce(_) => ErrorKind::Validation,
            EngineError::ReplayDetected => ErrorKind::Replay,
            EngineError::RateLimited { .. } => ErrorKind::RateLimited,
            EngineError::EntryNotFound(_) => ErrorKind::NotFound,
            EngineError::StorageUnavailable(_)
            | EngineError::Store(_)
            | EngineError::ChainContention { .. } => ErrorKind::Unavailable,
            EngineError::Core(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::RateLimited)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
