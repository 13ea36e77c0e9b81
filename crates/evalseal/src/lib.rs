//! # evalseal
//!
//! Tamper-evident evaluations: every result is freshness-checked,
//! replay-protected, rate-limited, HMAC-signed, and appended to a
//! hash-chained audit log before it is returned.
//!
//! ## Overview
//!
//! - **Signed records**: `input_hash`, `evaluation_hash`, and an HMAC tag
//!   under a key id from a rotating [`KeyRegistry`](core::KeyRegistry)
//! - **Audit chain**: totally ordered entries, each linked to the previous
//!   entry's hash, appended through compare-and-swap
//! - **Guards**: single-use nonces and fixed-window per-client budgets,
//!   enforced by atomic store primitives
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use evalseal::core::{KeyRegistry, SystemClock};
//! use evalseal::store::SqliteStore;
//! use evalseal::{Engine, EngineConfig, EvaluationRequest};
//!
//! async fn example() -> evalseal::Result<()> {
//!     let registry = Arc::new(KeyRegistry::parse("k1:secret-one", "k1").unwrap());
//!     let store = Arc::new(SqliteStore::open("audit.db")?);
//!     let engine = Engine::new(registry, store, Arc::new(SystemClock), EngineConfig::default());
//!
//!     let request: EvaluationRequest = serde_json::from_value(serde_json::json!({
//!         "input": {"epistemic": 0.8, "structural": 0.9, "risk": 0.1, "ethical": 0.95},
//!         "timestamp": "2025-01-14T16:00:00Z",
//!         "max_age_ms": 30000,
//!         "nonce": "b7c1f0e2a4d94e3f"
//!     }))
//!     .unwrap();
//!
//!     let evaluation = engine.evaluate("client-a", request).await?;
//!     println!("sealed as audit entry {}", evaluation.audit.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `evalseal::core` - Canonical hashing, keys, records, chain validation
//! - `evalseal::store` - Storage traits, memory and SQLite backends

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod rate_limit;
pub mod replay;

// Re-export component crates
pub use evalseal_core as core;
pub use evalseal_store as store;

// Re-export main types for convenience
pub use chain::AuditChain;
pub use config::{ChainConfig, ConfigError, EngineConfig, RateLimitConfig, ReplayConfig, StoreTimeout};
pub use engine::{
    AuditRef, Engine, EntryReport, Envelope, Evaluation, EvaluationRequest, HealthReport,
};
pub use error::{EngineError, ErrorKind, InputError, Result};
pub use evaluation::{
    compute_score, evaluate_governance, EvaluationInput, EvaluationResult, GovernanceVerdict,
    RiskLevel,
};
pub use rate_limit::RateLimiter;
pub use replay::ReplayGuard;

// Re-export commonly used core types
pub use evalseal_core::{
    AuditEntry, ChainBreak, ChainReport, EntryId, KeyRegistry, Payload, SignedRecord,
    VerificationReport,
};
