//! The audit chain: a totally ordered, hash-linked log of evaluations.
//!
//! Appends read the tail, seal an entry on top of it, and hand it to the
//! store's compare-and-swap. Losing the race means the tail moved; the entry
//! is resealed on the new tail and retried, up to a fixed number of attempts.

use std::sync::Arc;

use evalseal_core::{
    verify_entry, verify_links, AuditEntry, ChainBreak, ChainReport, ChainTail, Clock, EntryId,
    EntryVerification, Payload, GENESIS_HASH,
};
use evalseal_store::{AppendResult, ChainStore};

use crate::config::{ChainConfig, StoreTimeout};
use crate::error::{EngineError, Result};

/// Entries fetched per page while walking the chain.
const WALK_PAGE: u64 = 512;

/// Append and verification over a [`ChainStore`].
pub struct AuditChain<S: ChainStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ChainConfig,
    timeout: StoreTimeout,
}

impl<S: ChainStore> AuditChain<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: ChainConfig, timeout: StoreTimeout) -> Self {
        Self {
            store,
            clock,
            config,
            timeout,
        }
    }

    /// Append `(payload, result)` after the current tail.
    pub async fn append(&self, payload: Payload, result: Payload) -> Result<AuditEntry> {
        let attempts = self.config.max_append_attempts.max(1);

        for attempt in 1..=attempts {
            let tail = self.timeout.run("chain_tail", self.store.chain_tail()).await?;
            let (id, previous_hash) = ChainTail::successor(tail.as_ref());

            let entry = AuditEntry::seal(
                id,
                payload.clone(),
                result.clone(),
                previous_hash,
                self.clock.now_millis(),
            )
            .map_err(|e| {
                tracing::error!(error = %e, "failed to hash audit entry");
                EngineError::from(e)
            })?;

            match self.timeout.run("append_entry", self.store.append_entry(&entry)).await? {
                AppendResult::Appended => {
                    tracing::debug!(id = %entry.id, hash = %entry.hash, attempt, "audit entry appended");
                    return Ok(entry);
                }
                AppendResult::Conflict { current } => {
                    tracing::debug!(
                        attempt,
                        expected = %id,
                        current = ?current.map(|t| t.id),
                        "chain tail moved, retrying append"
                    );
                }
            }
        }

        tracing::warn!(attempts, "audit append gave up under contention");
        Err(EngineError::ChainContention { attempts })
    }

    /// Fetch an entry.
    pub async fn get(&self, id: EntryId) -> Result<AuditEntry> {
        self.timeout
            .run("get_entry", self.store.get_entry(id))
            .await?
            .ok_or(EngineError::EntryNotFound(id))
    }

    /// Recompute one entry's content hash.
    pub async fn verify(&self, id: EntryId) -> Result<EntryVerification> {
        let entry = self.get(id).await?;
        Ok(verify_entry(&entry)?)
    }

    /// Number of appended entries.
    pub async fn len(&self) -> Result<u64> {
        self.timeout.run("chain_len", self.store.chain_len()).await
    }

    /// Whether nothing has been appended yet.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Walk `from..=to` (defaulting to the whole chain), confirming every
    /// entry's content hash and its link to the entry before it.
    pub async fn verify_chain(&self, from: Option<EntryId>, to: Option<EntryId>) -> Result<ChainReport> {
        let len = self.len().await?;
        let from = from.unwrap_or(EntryId::FIRST);
        let to = to.unwrap_or(EntryId(len));

        if from.get() == 0 {
            return Err(EngineError::Validation("chain ids start at 1".into()));
        }
        if to.get() > len {
            return Err(EngineError::Validation(format!(
                "range end {to} is beyond the chain tail {len}"
            )));
        }

        let mut report = ChainReport {
            from,
            to,
            checked: 0,
            valid: true,
            first_break: None,
        };
        if from > to {
            return Ok(report);
        }

        let mut anchor = match from.prev() {
            None => GENESIS_HASH,
            Some(prev) => match self.timeout.run("get_entry", self.store.get_entry(prev)).await? {
                Some(entry) => entry.hash,
                None => {
                    report.valid = false;
                    report.first_break = Some(ChainBreak::Missing { id: prev });
                    return Ok(report);
                }
            },
        };

        let mut start = from;
        while start <= to {
            let end = EntryId(to.get().min(start.get().saturating_add(WALK_PAGE - 1)));
            let page = self
                .timeout
                .run("get_entries_range", self.store.get_entries_range(start, end))
                .await?;

            let page_report = verify_links(&page, start, end, anchor)?;
            report.checked += page_report.checked;
            if !page_report.valid {
                report.valid = false;
                report.first_break = page_report.first_break;
                tracing::warn!(break_at = ?report.first_break, "audit chain verification failed");
                return Ok(report);
            }

            if let Some(last) = page.last() {
                anchor = last.hash;
            }
            start = end.next();
        }

        Ok(report)
    }
}
