//! Audit entries: the links of the hash chain.
//!
//! Each entry commits to its own content and to its predecessor:
//!
//! ```text
//! hash = SHA256(canonical(payload) || canonical(result) || previous_hash)
//! ```
//!
//! `previous_hash` is appended as its 32 raw bytes. The first entry links to
//! [`GENESIS_HASH`]. The hash is a pure content hash and involves no key, so
//! rotating signing keys never invalidates chain links.

use serde::{Deserialize, Serialize};

use crate::canonical::canonicalize;
use crate::crypto::Sha256Hash;
use crate::error::Result;
use crate::record::SIGNATURE_VERSION;
use crate::types::{EntryId, Payload};

/// The `previous_hash` of the first entry in every chain.
pub const GENESIS_HASH: Sha256Hash = Sha256Hash::ZERO;

/// The position and hash of the newest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTail {
    pub id: EntryId,
    pub hash: Sha256Hash,
}

impl ChainTail {
    /// Id and previous hash the next appended entry must carry.
    pub fn successor(tail: Option<&ChainTail>) -> (EntryId, Sha256Hash) {
        match tail {
            Some(t) => (t.id.next(), t.hash),
            None => (EntryId::FIRST, GENESIS_HASH),
        }
    }
}

/// One persisted link of the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EntryId,
    pub payload: Payload,
    pub result: Payload,
    pub previous_hash: Sha256Hash,
    pub hash: Sha256Hash,
    pub signature_version: u16,
    /// Unix milliseconds.
    pub created_at: i64,
}

impl AuditEntry {
    /// Build an entry linked to `previous_hash`, computing its hash.
    pub fn seal(
        id: EntryId,
        payload: Payload,
        result: Payload,
        previous_hash: Sha256Hash,
        created_at: i64,
    ) -> Result<Self> {
        let hash = entry_hash(&payload, &result, &previous_hash)?;
        Ok(Self {
            id,
            payload,
            result,
            previous_hash,
            hash,
            signature_version: SIGNATURE_VERSION,
            created_at,
        })
    }

    /// Recompute the content hash from the stored fields.
    pub fn recompute_hash(&self) -> Result<Sha256Hash> {
        entry_hash(&self.payload, &self.result, &self.previous_hash)
    }

    /// This entry as a chain tail.
    pub fn tail(&self) -> ChainTail {
        ChainTail {
            id: self.id,
            hash: self.hash,
        }
    }
}

/// Content hash of an entry.
pub fn entry_hash(
    payload: &Payload,
    result: &Payload,
    previous_hash: &Sha256Hash,
) -> Result<Sha256Hash> {
    let payload_bytes = canonicalize(payload)?;
    let result_bytes = canonicalize(result)?;
    Ok(Sha256Hash::hash_parts(&[
        payload_bytes.as_slice(),
        result_bytes.as_slice(),
        previous_hash.as_bytes().as_slice(),
    ]))
}
