//! Golden test vectors for deterministic verification.
//!
//! Canonical bytes, record hashes, HMAC tags, and entry hashes are frozen:
//! records signed by one build must verify on every other. Any change to
//! these values means stored signatures and chains no longer verify.

use evalseal_core::{
    canonicalize, entry_hash, record, HmacTag, Payload, SecretKey, Sha256Hash, GENESIS_HASH,
};

/// A payload and its expected canonical encoding.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// JSON text of the payload.
    pub value: &'static str,
    /// Expected canonical bytes (hex).
    pub expected_bytes: &'static str,
    /// Expected SHA-256 of the canonical bytes (hex).
    pub expected_hash: &'static str,
}

/// A signed evaluation with every derived value pinned.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    pub name: &'static str,
    pub key_id: &'static str,
    pub secret: &'static str,
    pub input: &'static str,
    pub result: &'static str,
    pub governance: &'static str,
    pub expected_input_hash: &'static str,
    pub expected_evaluation_hash: &'static str,
    pub expected_hmac: &'static str,
}

/// An audit entry's content and its expected hash.
#[derive(Debug, Clone)]
pub struct EntryVector {
    pub name: &'static str,
    pub payload: &'static str,
    pub result: &'static str,
    /// Previous hash (hex); all zeros for the first entry.
    pub previous_hash: &'static str,
    pub expected_hash: &'static str,
}

const REFERENCE_INPUT: &str =
    r#"{"epistemic": 0.8, "structural": 0.9, "risk": 0.1, "ethical": 0.95}"#;
const REFERENCE_RESULT: &str = r#"{"rationality_score": 87.5}"#;
const REFERENCE_GOVERNANCE: &str =
    r#"{"governance_score": 80, "flags": ["missing_user"], "risk_level": "low"}"#;

/// Get all canonical encoding vectors.
pub fn canonical_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "empty object",
            value: "{}",
            expected_bytes: "a0",
            expected_hash: "c19a797fa1fd590cd2e5b42d1cf5f246e29b91684e2f87404b81dc345c7a56a0",
        },
        CanonicalVector {
            name: "integral float collapses to integer",
            value: r#"{"n": 1.0, "m": -24}"#,
            expected_bytes: "a2616d37616e01",
            expected_hash: "ecacc70de95b80320b859071b19adda65f0d8b25ef4e312e82a6041430fc482e",
        },
        CanonicalVector {
            name: "nested keys sorted length-first",
            value: r#"{"b": 1, "a": [true, null, "x"], "ab": {"z": -1, "y": 0.5}}"#,
            expected_bytes: "a3616183f5f66178616201626162a26179fb3fe0000000000000617a20",
            expected_hash: "cbebcd5c383679d9e8a390fc24aed511992c3de5fe7a49576cb49d33ae45ef6e",
        },
    ]
}

/// Get all signature vectors.
pub fn signature_vectors() -> Vec<SignatureVector> {
    vec![
        SignatureVector {
            name: "reference evaluation under k1",
            key_id: "k1",
            secret: "golden-secret-one",
            input: REFERENCE_INPUT,
            result: REFERENCE_RESULT,
            governance: REFERENCE_GOVERNANCE,
            expected_input_hash: "2b8b77bcab082ff273262164afebd5a46f45233812f34136caeede6ff971f8b6",
            expected_evaluation_hash:
                "be385c6630f1ade010375e8cb111a49c79bff0c1cf717c7a7ea5fb8f52833a63",
            expected_hmac: "f665bb819c449c31c2a6c06bd50a0634b08ad6a890177a415f2f359f5683f3bf",
        },
        SignatureVector {
            name: "same evaluation under k2",
            key_id: "k2",
            secret: "golden-secret-two",
            input: REFERENCE_INPUT,
            result: REFERENCE_RESULT,
            governance: REFERENCE_GOVERNANCE,
            expected_input_hash: "2b8b77bcab082ff273262164afebd5a46f45233812f34136caeede6ff971f8b6",
            expected_evaluation_hash:
                "be385c6630f1ade010375e8cb111a49c79bff0c1cf717c7a7ea5fb8f52833a63",
            expected_hmac: "f50a17d5d2d005b565d67cd2d8ecdde4b3246e9cfcc254b829cc8a5b11c4ca77",
        },
    ]
}

/// Get all entry hash vectors, in chain order.
pub fn entry_vectors() -> Vec<EntryVector> {
    vec![
        EntryVector {
            name: "first entry links to genesis",
            payload: REFERENCE_INPUT,
            result: REFERENCE_RESULT,
            previous_hash: "0000000000000000000000000000000000000000000000000000000000000000",
            expected_hash: "2510ef0ce0c1fb9549db0e01061c67f4618e8937bc8df644cb494809b62178c9",
        },
        EntryVector {
            name: "second entry links to the first",
            payload: r#"{"n": 2}"#,
            result: r#"{"ok": true}"#,
            previous_hash: "2510ef0ce0c1fb9549db0e01061c67f4618e8937bc8df644cb494809b62178c9",
            expected_hash: "2842d22bebd532ec768baf17c38a8e0ba3b2371944582e6d80073768cceda7bc",
        },
    ]
}

fn parse(json: &str) -> Payload {
    serde_json::from_str(json).expect("vector JSON is valid")
}

fn parse_hash(hex: &str) -> Sha256Hash {
    Sha256Hash::from_hex(hex).expect("vector hash is valid hex")
}

/// Compute the canonical bytes of a vector's payload.
pub fn compute_canonical(vector: &CanonicalVector) -> Vec<u8> {
    canonicalize(&parse(vector.value)).expect("vector payload encodes")
}

/// Compute `(input_hash, evaluation_hash, hmac)` for a signature vector.
pub fn compute_signature(vector: &SignatureVector) -> (Sha256Hash, Sha256Hash, HmacTag) {
    let input_hash = record::input_hash(&parse(vector.input)).expect("input encodes");
    let evaluation_hash =
        record::evaluation_hash(&input_hash, &parse(vector.result), &parse(vector.governance))
            .expect("evaluation encodes");
    let secret = SecretKey::new(vector.secret.as_bytes().to_vec());
    let hmac = HmacTag::compute(&secret, evaluation_hash.as_bytes()).expect("key accepted");
    (input_hash, evaluation_hash, hmac)
}

/// Compute an entry vector's hash.
pub fn compute_entry_hash(vector: &EntryVector) -> Sha256Hash {
    entry_hash(
        &parse(vector.payload),
        &parse(vector.result),
        &parse_hash(vector.previous_hash),
    )
    .expect("entry encodes")
}

/// Check every vector. Returns `(name, matches, computed)` per derived value.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let mut out = Vec::new();

    for v in canonical_vectors() {
        let bytes = compute_canonical(&v);
        let hex = hex::encode(&bytes);
        out.push((format!("{} (bytes)", v.name), hex == v.expected_bytes, hex));
        let hash = Sha256Hash::hash(&bytes).to_hex();
        out.push((format!("{} (hash)", v.name), hash == v.expected_hash, hash));
    }

    for v in signature_vectors() {
        let (input_hash, evaluation_hash, hmac) = compute_signature(&v);
        for (label, actual, expected) in [
            ("input_hash", input_hash.to_hex(), v.expected_input_hash),
            ("evaluation_hash", evaluation_hash.to_hex(), v.expected_evaluation_hash),
            ("hmac", hex::encode(hmac.as_bytes()), v.expected_hmac),
        ] {
            out.push((format!("{} ({label})", v.name), actual == expected, actual));
        }
    }

    for v in entry_vectors() {
        let hash = compute_entry_hash(&v).to_hex();
        out.push((v.name.to_string(), hash == v.expected_hash, hash));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, actual) in verify_all_vectors() {
            assert!(matches, "vector '{name}' computed {actual}");
        }
    }

    #[test]
    fn test_first_entry_starts_at_genesis() {
        let first = &entry_vectors()[0];
        assert_eq!(parse_hash(first.previous_hash), GENESIS_HASH);
    }

    #[test]
    fn test_entry_vectors_chain() {
        let vectors = entry_vectors();
        for pair in vectors.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].expected_hash);
        }
    }

    #[test]
    fn test_key_changes_only_the_tag() {
        let vectors = signature_vectors();
        let (a_in, a_eval, a_tag) = compute_signature(&vectors[0]);
        let (b_in, b_eval, b_tag) = compute_signature(&vectors[1]);
        assert_eq!(a_in, b_in);
        assert_eq!(a_eval, b_eval);
        assert_ne!(a_tag, b_tag);
    }
}
