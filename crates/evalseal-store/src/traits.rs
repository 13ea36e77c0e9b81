//! Store traits: the abstract interface over shared state.
//!
//! Every cross-request invariant (a nonce admitted once, a counter bound to
//! one window, a totally ordered chain) is enforced by a single atomic
//! primitive here. Callers never read-then-write.

use async_trait::async_trait;
use evalseal_core::{AuditEntry, ChainTail, EntryId};

use crate::error::Result;

/// Result of a conditional nonce insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceInsert {
    /// The nonce was absent (or expired) and is now recorded.
    Inserted,
    /// A live record for this nonce already exists.
    Exists,
}

/// Result of appending an entry to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// The entry was persisted and the tail advanced to it.
    Appended,
    /// The tail moved since the entry was built.
    Conflict {
        /// The tail as it is now.
        current: Option<ChainTail>,
    },
}

/// Replay and rate-limit state.
///
/// All times are Unix milliseconds supplied by the caller.
#[async_trait]
pub trait GuardStore: Send + Sync {
    /// Record `nonce` unless a live record exists.
    ///
    /// A record whose `expires_at <= now` is treated as absent and replaced.
    async fn insert_nonce_if_absent(
        &self,
        nonce: &str,
        expires_at: i64,
        now: i64,
    ) -> Result<NonceInsert>;

    /// Increment the counter for `client_key` in its current fixed window.
    ///
    /// When no window is open (or it expired at or before `now`), a new one
    /// starts at `now` with a count of 1. Returns the post-increment count.
    async fn increment_window(&self, client_key: &str, window_ms: i64, now: i64) -> Result<u64>;

    /// Delete expired nonces and counters. Returns the number removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Audit chain persistence.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// The newest entry's id and hash, or `None` for an empty chain.
    async fn chain_tail(&self) -> Result<Option<ChainTail>>;

    /// Persist `entry` and advance the tail to it, atomically.
    ///
    /// This is a compare-and-swap: it succeeds only if the current tail is
    /// exactly the predecessor `entry` was built on (`entry.id - 1` with
    /// hash `entry.previous_hash`, or an empty chain for the first entry).
    async fn append_entry(&self, entry: &AuditEntry) -> Result<AppendResult>;

    /// Get an entry by id.
    async fn get_entry(&self, id: EntryId) -> Result<Option<AuditEntry>>;

    /// Get entries with `from <= id <= to`, ordered by id.
    async fn get_entries_range(&self, from: EntryId, to: EntryId) -> Result<Vec<AuditEntry>>;

    /// Number of entries appended so far (the tail id).
    async fn chain_len(&self) -> Result<u64>;
}

/// A store that holds every kind of shared state.
pub trait Store: GuardStore + ChainStore {}

impl<S: GuardStore + ChainStore + ?Sized> Store for S {}

/// Whether `current` is the tail `entry` expects to extend.
pub(crate) fn tail_matches(current: Option<&ChainTail>, entry: &AuditEntry) -> bool {
    let (expected_id, expected_previous) = ChainTail::successor(current);
    expected_id == entry.id && expected_previous == entry.previous_hash
}
