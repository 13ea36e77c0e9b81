//! In-memory implementation of the store traits.
//!
//! This is primarily for testing and single-process deployments. It has the
//! same semantics as SQLite but keeps everything in memory with no
//! persistence. Each primitive holds the write lock for its whole duration,
//! which is what makes it atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use evalseal_core::{AuditEntry, ChainTail, EntryId};

use crate::error::{Result, StoreError};
use crate::traits::{tail_matches, AppendResult, ChainStore, GuardStore, NonceInsert};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Nonce -> expires_at.
    nonces: HashMap<String, i64>,

    /// Client key -> counter.
    counters: HashMap<String, Counter>,

    /// Audit entries by id.
    entries: BTreeMap<EntryId, AuditEntry>,

    tail: Option<ChainTail>,
}

struct Counter {
    count: u64,
    window_expires_at: i64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    /// Replace a stored entry in place, bypassing every chain check.
    ///
    /// Exists so tests can simulate tampering with persisted records.
    #[doc(hidden)]
    pub fn overwrite_entry(&self, entry: AuditEntry) -> Result<()> {
        self.write()?.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Remove a stored entry, bypassing every chain check.
    #[doc(hidden)]
    pub fn remove_entry(&self, id: EntryId) -> Result<Option<AuditEntry>> {
        Ok(self.write()?.entries.remove(&id))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GuardStore for MemoryStore {
    async fn insert_nonce_if_absent(
        &self,
        nonce: &str,
        expires_at: i64,
        now: i64,
    ) -> Result<NonceInsert> {
        let mut inner = self.write()?;

        match inner.nonces.get(nonce) {
            Some(&existing) if existing > now => Ok(NonceInsert::Exists),
            _ => {
                inner.nonces.insert(nonce.to_string(), expires_at);
                Ok(NonceInsert::Inserted)
            }
        }
    }

    async fn increment_window(&self, client_key: &str, window_ms: i64, now: i64) -> Result<u64> {
        let mut inner = self.write()?;

        let counter = inner
            .counters
            .entry(client_key.to_string())
            .or_insert(Counter {
                count: 0,
                window_expires_at: now,
            });

        if counter.window_expires_at <= now {
            counter.count = 0;
            counter.window_expires_at = now.saturating_add(window_ms);
        }
        counter.count += 1;

        Ok(counter.count)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut inner = self.write()?;

        let nonces_before = inner.nonces.len();
        inner.nonces.retain(|_, expires_at| *expires_at > now);
        let counters_before = inner.counters.len();
        inner.counters.retain(|_, c| c.window_expires_at > now);

        let removed =
            (nonces_before - inner.nonces.len()) + (counters_before - inner.counters.len());
        Ok(removed as u64)
    }

    async fn ping(&self) -> Result<()> {
        self.read().map(|_| ())
    }
}

#[async_trait]
impl ChainStore for MemoryStore {
    async fn chain_tail(&self) -> Result<Option<ChainTail>> {
        Ok(self.read()?.tail)
    }

    async fn append_entry(&self, entry: &AuditEntry) -> Result<AppendResult> {
        let mut inner = self.write()?;

        if !tail_matches(inner.tail.as_ref(), entry) {
            return Ok(AppendResult::Conflict {
                current: inner.tail,
            });
        }

        inner.entries.insert(entry.id, entry.clone());
        inner.tail = Some(entry.tail());
        Ok(AppendResult::Appended)
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<AuditEntry>> {
        Ok(self.read()?.entries.get(&id).cloned())
    }

    async fn get_entries_range(&self, from: EntryId, to: EntryId) -> Result<Vec<AuditEntry>> {
        if from > to {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner.entries.range(from..=to).map(|(_, e)| e.clone()).collect())
    }

    async fn chain_len(&self) -> Result<u64> {
        Ok(self.read()?.tail.map(|t| t.id.get()).unwrap_or(0))
    }
}
