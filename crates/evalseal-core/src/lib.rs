//! # evalseal core
//!
//! Pure primitives for evalseal: canonicalization, signed evaluation records,
//! and hash-linked audit entries.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over deterministic encodings and keyed hashes.
//!
//! ## Key Types
//!
//! - [`SignedRecord`] - HMAC-signed binding of input, result, and governance
//! - [`Signer`] - Builds and verifies records against a [`KeyRegistry`]
//! - [`AuditEntry`] - One link of the audit chain
//! - [`FreshnessPolicy`] - Request timestamp bounds
//!
//! ## Canonicalization
//!
//! Every hash is taken over deterministic CBOR. See [`canonical`] module.

pub mod audit;
pub mod canonical;
pub mod clock;
pub mod crypto;
pub mod error;
pub mod freshness;
pub mod keys;
pub mod record;
pub mod types;
pub mod validation;

pub use audit::{entry_hash, AuditEntry, ChainTail, GENESIS_HASH};
pub use canonical::{canonical_hash, canonicalize};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{HmacTag, SecretKey, Sha256Hash};
pub use error::{CoreError, FreshnessError, KeyConfigError};
pub use freshness::{rfc3339_from_millis, FreshRequest, FreshnessPolicy};
pub use keys::{KeyConfig, KeyRegistry, SigningKey};
pub use record::{
    SignedRecord, Signer, VerificationChecks, VerificationReport, SIGNATURE_VERSION,
};
pub use types::{EntryId, Payload};
pub use validation::{verify_entry, verify_links, ChainBreak, ChainReport, EntryVerification};
