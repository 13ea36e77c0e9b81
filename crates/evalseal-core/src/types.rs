//! Strong type definitions for evalseal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured payload: mapping, sequence, or scalar.
///
/// Only the canonicalization boundary handles arbitrary payloads; everything
/// else in the crate graph is concretely typed.
pub type Payload = serde_json::Value;

/// Position of an entry in the audit chain (1-indexed, contiguous).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// The first entry of every chain.
    pub const FIRST: Self = Self(1);

    /// Get the raw position.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The entry that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The entry before this one, or `None` for the first entry.
    pub fn prev(self) -> Option<Self> {
        if self.0 > 1 {
            Some(Self(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_navigation() {
        assert_eq!(EntryId::FIRST.next(), EntryId(2));
        assert_eq!(EntryId(2).prev(), Some(EntryId::FIRST));
        assert_eq!(EntryId::FIRST.prev(), None);
    }

    #[test]
    fn test_entry_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&EntryId(7)).unwrap(), "7");
    }
}
