//! # evalseal testkit
//!
//! Testing utilities for evalseal.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known canonical bytes, record hashes, HMAC tags, and
//!   entry hashes that every build must reproduce
//! - **Generators**: Proptest strategies for payloads and scoring inputs
//! - **Fixtures**: An engine wired to a memory store and a manual clock
//!
//! ## Golden Vectors
//!
//! ```rust
//! use evalseal_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, actual) in verify_all_vectors() {
//!     assert!(ok, "{name}: got {actual}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use evalseal_testkit::generators::json_value;
//!
//! proptest! {
//!     #[test]
//!     fn hash_is_deterministic(value in json_value()) {
//!         prop_assert_eq!(canonical_hash(&value)?, canonical_hash(&value)?);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use evalseal_testkit::fixtures::{reference_input, TestFixture};
//!
//! let fixture = TestFixture::new();
//! let request = fixture.request(reference_input());
//! let evaluation = fixture.engine.evaluate("client", request).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{random_nonce, reference_input, test_registry, TestFixture, FIXTURE_KEYS, FIXTURE_NOW};
pub use generators::{json_value, ScoringParams};
pub use vectors::{canonical_vectors, entry_vectors, signature_vectors, verify_all_vectors};
