//! Audit chain validation: per-entry content checks and link walks.
//!
//! These functions are pure. Callers fetch entries from storage and hand
//! them over; nothing here trusts a stored hash without recomputing it.

use serde::{Deserialize, Serialize};

use crate::audit::AuditEntry;
use crate::crypto::Sha256Hash;
use crate::error::Result;
use crate::types::EntryId;

/// Result of recomputing a single entry's content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryVerification {
    pub id: EntryId,
    pub valid: bool,
    /// The stored hash.
    pub hash: Sha256Hash,
    /// The hash recomputed from the stored content.
    pub computed_hash: Sha256Hash,
    pub previous_hash: Sha256Hash,
}

/// Recompute an entry's hash and compare it to the stored one.
pub fn verify_entry(entry: &AuditEntry) -> Result<EntryVerification> {
    let computed_hash = entry.recompute_hash()?;
    Ok(EntryVerification {
        id: entry.id,
        valid: computed_hash.ct_eq(&entry.hash),
        hash: entry.hash,
        computed_hash,
        previous_hash: entry.previous_hash,
    })
}

/// The first defect found while walking a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainBreak {
    /// An id in the range has no entry.
    Missing { id: EntryId },
    /// The entry's content no longer hashes to its stored hash.
    ContentMismatch {
        id: EntryId,
        stored: Sha256Hash,
        computed: Sha256Hash,
    },
    /// The entry does not point at its predecessor's hash.
    LinkMismatch {
        id: EntryId,
        expected: Sha256Hash,
        found: Sha256Hash,
    },
}

impl ChainBreak {
    pub fn id(&self) -> EntryId {
        match self {
            ChainBreak::Missing { id }
            | ChainBreak::ContentMismatch { id, .. }
            | ChainBreak::LinkMismatch { id, .. } => *id,
        }
    }
}

/// Outcome of walking a range of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub from: EntryId,
    pub to: EntryId,
    /// Entries confirmed before the walk stopped.
    pub checked: u64,
    pub valid: bool,
    pub first_break: Option<ChainBreak>,
}

/// Walk `from..=to`, confirming ids, content hashes, and links.
///
/// `entries` must be sorted by id. `anchor` is the hash entry `from` must
/// link to: the genesis hash for the first entry, otherwise the stored hash
/// of entry `from - 1`.
pub fn verify_links(
    entries: &[AuditEntry],
    from: EntryId,
    to: EntryId,
    anchor: Sha256Hash,
) -> Result<ChainReport> {
    let mut report = ChainReport {
        from,
        to,
        checked: 0,
        valid: true,
        first_break: None,
    };

    let mut expected_previous = anchor;
    let mut iter = entries.iter();

    let mut id = from;
    while id <= to {
        let entry = match iter.next() {
            Some(entry) if entry.id == id => entry,
            _ => return Ok(report.broken(ChainBreak::Missing { id })),
        };

        if !entry.previous_hash.ct_eq(&expected_previous) {
            return Ok(report.broken(ChainBreak::LinkMismatch {
                id,
                expected: expected_previous,
                found: entry.previous_hash,
            }));
        }

        let computed = entry.recompute_hash()?;
        if !computed.ct_eq(&entry.hash) {
            return Ok(report.broken(ChainBreak::ContentMismatch {
                id,
                stored: entry.hash,
                computed,
            }));
        }

        expected_previous = entry.hash;
        report.checked += 1;
        id = id.next();
    }

    Ok(report)
}

impl ChainReport {
    fn broken(mut self, at: ChainBreak) -> Self {
        self.valid = false;
        self.first_break = Some(at);
        self
    }
}
