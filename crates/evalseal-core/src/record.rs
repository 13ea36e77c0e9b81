//! Signed evaluation records.
//!
//! A [`SignedRecord`] binds an evaluation's input, result, and governance
//! verdict to an HMAC tag under a named key:
//!
//! ```text
//! input_hash      = SHA256(canonical(input))
//! evaluation_hash = SHA256(canonical({input_hash: hex, result, governance}))
//! hmac            = HMAC-SHA256(secret[key_id], evaluation_hash)
//! ```
//!
//! The tag covers the 32 raw digest bytes. Verification resolves the secret
//! from the record's own `key_id`, so records signed before a key rotation
//! still verify as long as the old key stays in the registry.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical::canonical_hash;
use crate::clock::Clock;
use crate::crypto::{HmacTag, Sha256Hash};
use crate::error::Result;
use crate::keys::KeyRegistry;
use crate::types::Payload;

/// Current record/entry signature format version.
pub const SIGNATURE_VERSION: u16 = 1;

/// The signature envelope attached to every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub key_id: String,
    pub input_hash: Sha256Hash,
    pub evaluation_hash: Sha256Hash,
    pub hmac: HmacTag,
    /// Unix milliseconds at signing time.
    pub timestamp: i64,
}

/// Individual verification checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChecks {
    pub input_hash_match: bool,
    pub evaluation_hash_match: bool,
    pub hmac_match: bool,
    pub key_found: bool,
}

/// Outcome of re-verifying a record. A mismatch is a report, not an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub checks: VerificationChecks,
}

impl VerificationReport {
    fn from_checks(checks: VerificationChecks) -> Self {
        Self {
            valid: checks.key_found
                && checks.input_hash_match
                && checks.evaluation_hash_match
                && checks.hmac_match,
            checks,
        }
    }

    /// Report for a record whose key id does not resolve.
    pub fn key_not_found() -> Self {
        Self::default()
    }
}

/// Hash of the canonical input.
pub fn input_hash(input: &Payload) -> Result<Sha256Hash> {
    canonical_hash(input)
}

/// Hash binding the input hash to the result and governance verdict.
pub fn evaluation_hash(
    input_hash: &Sha256Hash,
    result: &Payload,
    governance: &Payload,
) -> Result<Sha256Hash> {
    canonical_hash(&json!({
        "input_hash": input_hash.to_hex(),
        "result": result,
        "governance": governance,
    }))
}

/// Builds and verifies signed records against a key registry.
#[derive(Clone)]
pub struct Signer {
    registry: Arc<KeyRegistry>,
    clock: Arc<dyn Clock>,
}

impl Signer {
    pub fn new(registry: Arc<KeyRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// The registry backing this signer.
    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Sign an evaluation under the active key.
    pub fn build(
        &self,
        input: &Payload,
        result: &Payload,
        governance: &Payload,
    ) -> Result<SignedRecord> {
        let (key_id, secret) = self.registry.active();

        let input_hash = input_hash(input)?;
        let evaluation_hash = evaluation_hash(&input_hash, result, governance)?;
        let hmac = HmacTag::compute(secret, evaluation_hash.as_bytes())?;

        Ok(SignedRecord {
            key_id: key_id.to_string(),
            input_hash,
            evaluation_hash,
            hmac,
            timestamp: self.clock.now_millis(),
        })
    }

    /// Recompute every hash and the tag, and compare against `record`.
    ///
    /// Errors only when the supplied values cannot be canonicalized.
    pub fn verify(
        &self,
        input: &Payload,
        result: &Payload,
        governance: &Payload,
        record: &SignedRecord,
    ) -> Result<VerificationReport> {
        let secret = match self.registry.by_id(&record.key_id) {
            Some(secret) => secret,
            None => return Ok(VerificationReport::key_not_found()),
        };

        let input_hash = input_hash(input)?;
        let evaluation_hash = evaluation_hash(&input_hash, result, governance)?;
        let hmac = HmacTag::compute(secret, evaluation_hash.as_bytes())?;

        Ok(VerificationReport::from_checks(VerificationChecks {
            input_hash_match: input_hash.ct_eq(&record.input_hash),
            evaluation_hash_match: evaluation_hash.ct_eq(&record.evaluation_hash),
            hmac_match: hmac.ct_eq(&record.hmac),
            key_found: true,
        }))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    const NOW: i64 = 1_736_870_400_000;

    fn signer(keys: &str, active: &str) -> Signer {
        let registry = KeyRegistry::parse(keys, active).unwrap();
        Signer::new(Arc::new(registry), Arc::new(ManualClock::new(NOW)))
    }

    fn sample() -> (Payload, Payload, Payload) {
        (
            json!({"user": "alice", "epistemic": 0.9}),
            json!({"rationality_score": 87.5}),
            json!({"score": 100, "risk": "low", "flags": []}),
        )
    }

    #[test]
    fn test_build_then_verify() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();

        let record = signer.build(&input, &result, &governance).unwrap();
        assert_eq!(record.key_id, "k1");
        assert_eq!(record.timestamp, NOW);

        let report = signer.verify(&input, &result, &governance, &record).unwrap();
        assert!(report.valid);
        assert!(report.checks.key_found);
    }

    #[test]
    fn test_hmac_over_raw_evaluation_hash() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();
        let record = signer.build(&input, &result, &governance).unwrap();

        let expected = HmacTag::compute(
            &crate::crypto::SecretKey::new(b"secret-one".to_vec()),
            record.evaluation_hash.as_bytes(),
        )
        .unwrap();
        assert_eq!(record.hmac, expected);
    }

    #[test]
    fn test_tampered_result_fails_only_downstream_checks() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();
        let record = signer.build(&input, &result, &governance).unwrap();

        let tampered = json!({"rationality_score": 99.0});
        let report = signer.verify(&input, &tampered, &governance, &record).unwrap();
        assert!(!report.valid);
        assert!(report.checks.input_hash_match);
        assert!(!report.checks.evaluation_hash_match);
        assert!(!report.checks.hmac_match);
        assert!(report.checks.key_found);
    }

    #[test]
    fn test_tampered_input_fails_every_hash_check() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();
        let record = signer.build(&input, &result, &governance).unwrap();

        let tampered = json!({"user": "mallory", "epistemic": 0.9});
        let report = signer.verify(&tampered, &result, &governance, &record).unwrap();
        assert!(!report.valid);
        assert!(!report.checks.input_hash_match);
        assert!(!report.checks.evaluation_hash_match);
        assert!(!report.checks.hmac_match);
    }

    #[test]
    fn test_unknown_key_id() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();
        let mut record = signer.build(&input, &result, &governance).unwrap();
        record.key_id = "ghost".into();

        let report = signer.verify(&input, &result, &governance, &record).unwrap();
        assert_eq!(report, VerificationReport::key_not_found());
        assert!(!report.valid);
        assert!(!report.checks.input_hash_match);
    }

    #[test]
    fn test_key_rotation_keeps_old_records_valid() {
        let before = signer("A:alpha,B:bravo", "A");
        let after = signer("A:alpha,B:bravo", "B");
        let (input, result, governance) = sample();

        let old = before.build(&input, &result, &governance).unwrap();
        let new = after.build(&input, &result, &governance).unwrap();
        assert_eq!(new.key_id, "B");
        assert_ne!(old.hmac, new.hmac);
        assert_eq!(old.evaluation_hash, new.evaluation_hash);

        assert!(after.verify(&input, &result, &governance, &old).unwrap().valid);
        assert!(after.verify(&input, &result, &governance, &new).unwrap().valid);
    }

    #[test]
    fn test_key_isolation() {
        let a = signer("A:alpha", "A");
        let b = signer("A:not-alpha", "A");
        let (input, result, governance) = sample();

        let record = a.build(&input, &result, &governance).unwrap();
        let report = b.verify(&input, &result, &governance, &record).unwrap();
        assert!(!report.valid);
        assert!(report.checks.evaluation_hash_match);
        assert!(!report.checks.hmac_match);
    }

    #[test]
    fn test_record_serializes_hex() {
        let signer = signer("k1:secret-one", "k1");
        let (input, result, governance) = sample();
        let record = signer.build(&input, &result, &governance).unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["input_hash"].as_str().unwrap().len(), 64);
        assert_eq!(json["hmac"].as_str().unwrap().len(), 64);
        let back: SignedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    proptest! {
        #[test]
        fn test_sign_verify_any_scores(e in 0.0f64..=1.0, s in 0.0f64..=1.0, user in "[a-z]{0,12}") {
            let signer = signer("k1:secret-one", "k1");
            let input = json!({"user": user, "epistemic": e, "structural": s});
            let result = json!({"rationality_score": e * 100.0});
            let governance = json!({"risk": "low"});

            let record = signer.build(&input, &result, &governance).unwrap();
            prop_assert!(signer.verify(&input, &result, &governance, &record).unwrap().valid);
        }
    }
}
