//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for evalseal. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Every primitive is either one statement or one `IMMEDIATE` transaction,
//! so several processes opening the same database file observe the same
//! atomicity as tasks sharing one handle.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use evalseal_core::{AuditEntry, ChainTail, EntryId, Sha256Hash, SystemClock, Clock};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{tail_matches, AppendResult, ChainStore, GuardStore, NonceInsert};

/// How long a writer waits on another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        migration::migrate(&mut conn, SystemClock.now_millis())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

// Helpers to convert between rows and entries

fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_value(bytes: &[u8]) -> Result<Value> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_hash(bytes: Vec<u8>, column: &str) -> Result<Sha256Hash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| StoreError::InvalidData(format!("{column}: expected 32 bytes, got {}", b.len())))?;
    Ok(Sha256Hash::from_bytes(arr))
}

fn decode_id(id: i64) -> Result<EntryId> {
    u64::try_from(id)
        .map(EntryId)
        .map_err(|_| StoreError::InvalidData(format!("negative entry id {id}")))
}

fn encode_id(id: EntryId) -> Result<i64> {
    i64::try_from(id.get()).map_err(|_| StoreError::InvalidData(format!("entry id {id} out of range")))
}

/// Raw column values, decoded outside the rusqlite row closure.
struct EntryRow {
    id: i64,
    payload: Vec<u8>,
    result: Vec<u8>,
    previous_hash: Vec<u8>,
    hash: Vec<u8>,
    signature_version: u16,
    created_at: i64,
}

const ENTRY_COLUMNS: &str =
    "id, payload, result, previous_hash, hash, signature_version, created_at";

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok(EntryRow {
        id: row.get("id")?,
        payload: row.get("payload")?,
        result: row.get("result")?,
        previous_hash: row.get("previous_hash")?,
        hash: row.get("hash")?,
        signature_version: row.get("signature_version")?,
        created_at: row.get("created_at")?,
    })
}

impl EntryRow {
    fn into_entry(self) -> Result<AuditEntry> {
        Ok(AuditEntry {
            id: decode_id(self.id)?,
            payload: decode_value(&self.payload)?,
            result: decode_value(&self.result)?,
            previous_hash: decode_hash(self.previous_hash, "previous_hash")?,
            hash: decode_hash(self.hash, "hash")?,
            signature_version: self.signature_version,
            created_at: self.created_at,
        })
    }
}

fn read_tail(conn: &Connection) -> Result<Option<ChainTail>> {
    let row: Option<(i64, Vec<u8>)> = conn
        .query_row(
            "SELECT id, hash FROM chain_tail WHERE singleton = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(id, hash)| {
        Ok(ChainTail {
            id: decode_id(id)?,
            hash: decode_hash(hash, "chain_tail.hash")?,
        })
    })
    .transpose()
}

#[async_trait]
impl GuardStore for SqliteStore {
    async fn insert_nonce_if_absent(
        &self,
        nonce: &str,
        expires_at: i64,
        now: i64,
    ) -> Result<NonceInsert> {
        let nonce = nonce.to_string();

        self.with_conn(move |conn| {
            // A live row makes the upsert's WHERE false, leaving changes() at 0
            let changed = conn.execute(
                "INSERT INTO nonces (value, expires_at) VALUES (?1, ?2)
                 ON CONFLICT(value) DO UPDATE SET expires_at = excluded.expires_at
                 WHERE nonces.expires_at <= ?3",
                params![nonce, expires_at, now],
            )?;

            Ok(if changed == 1 {
                NonceInsert::Inserted
            } else {
                NonceInsert::Exists
            })
        })
        .await
    }

    async fn increment_window(&self, client_key: &str, window_ms: i64, now: i64) -> Result<u64> {
        let client_key = client_key.to_string();

        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "INSERT INTO rate_counters (client_key, count, window_expires_at)
                 VALUES (?1, 1, ?2 + ?3)
                 ON CONFLICT(client_key) DO UPDATE SET
                     count = CASE WHEN rate_counters.window_expires_at <= ?2
                                  THEN 1 ELSE rate_counters.count + 1 END,
                     window_expires_at = CASE WHEN rate_counters.window_expires_at <= ?2
                                  THEN ?2 + ?3 ELSE rate_counters.window_expires_at END
                 RETURNING count",
                params![client_key, now, window_ms],
                |row| row.get(0),
            )?;

            u64::try_from(count).map_err(|_| StoreError::InvalidData(format!("negative counter {count}")))
        })
        .await
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let nonces = tx.execute("DELETE FROM nonces WHERE expires_at <= ?1", params![now])?;
            let counters = tx.execute(
                "DELETE FROM rate_counters WHERE window_expires_at <= ?1",
                params![now],
            )?;
            tx.commit()?;
            Ok((nonces + counters) as u64)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ChainStore for SqliteStore {
    async fn chain_tail(&self) -> Result<Option<ChainTail>> {
        self.with_conn(|conn| read_tail(conn)).await
    }

    async fn append_entry(&self, entry: &AuditEntry) -> Result<AppendResult> {
        let id = encode_id(entry.id)?;
        let payload = encode_value(&entry.payload)?;
        let result = encode_value(&entry.result)?;
        let entry = entry.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = read_tail(&tx)?;
            if !tail_matches(current.as_ref(), &entry) {
                return Ok(AppendResult::Conflict { current });
            }

            // Guarded on the predecessor even inside the write lock
            let swapped = match current {
                None => tx.execute(
                    "INSERT INTO chain_tail (singleton, id, hash) VALUES (0, ?1, ?2)
                     ON CONFLICT(singleton) DO NOTHING",
                    params![id, entry.hash.as_bytes().as_slice()],
                )?,
                Some(prev) => tx.execute(
                    "UPDATE chain_tail SET id = ?1, hash = ?2
                     WHERE singleton = 0 AND id = ?3 AND hash = ?4",
                    params![
                        id,
                        entry.hash.as_bytes().as_slice(),
                        encode_id(prev.id)?,
                        prev.hash.as_bytes().as_slice(),
                    ],
                )?,
            };
            if swapped != 1 {
                let current = read_tail(&tx)?;
                return Ok(AppendResult::Conflict { current });
            }

            tx.execute(
                "INSERT INTO audit_entries (
                    id, payload, result, previous_hash, hash, signature_version, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    payload,
                    result,
                    entry.previous_hash.as_bytes().as_slice(),
                    entry.hash.as_bytes().as_slice(),
                    entry.signature_version,
                    entry.created_at,
                ],
            )?;

            tx.commit()?;
            Ok(AppendResult::Appended)
        })
        .await
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<AuditEntry>> {
        let id = encode_id(id)?;

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM audit_entries WHERE id = ?1"),
                    params![id],
                    read_entry_row,
                )
                .optional()?;
            row.map(EntryRow::into_entry).transpose()
        })
        .await
    }

    async fn get_entries_range(&self, from: EntryId, to: EntryId) -> Result<Vec<AuditEntry>> {
        let from = encode_id(from)?;
        let to = encode_id(to)?;

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_entries
                 WHERE id >= ?1 AND id <= ?2
                 ORDER BY id"
            ))?;

            let rows = stmt
                .query_map(params![from, to], read_entry_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter().map(EntryRow::into_entry).collect()
        })
        .await
    }

    async fn chain_len(&self) -> Result<u64> {
        self.with_conn(|conn| Ok(read_tail(conn)?.map(|t| t.id.get()).unwrap_or(0)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalseal_core::{verify_links, GENESIS_HASH};
    use serde_json::json;

    fn entry_after(tail: Option<&ChainTail>, n: u64) -> AuditEntry {
        let (id, prev) = ChainTail::successor(tail);
        AuditEntry::seal(
            id,
            json!({"n": n, "ratio": 0.1 + n as f64, "big": u64::MAX, "neg": -7}),
            json!({"ok": true, "score": 87.5}),
            prev,
            1_000 + n as i64,
        )
        .unwrap()
    }

    async fn append_n(store: &SqliteStore, n: u64) -> Vec<AuditEntry> {
        let mut entries: Vec<AuditEntry> = Vec::new();
        for i in 1..=n {
            let entry = entry_after(entries.last().map(|e| e.tail()).as_ref(), i);
            assert_eq!(store.append_entry(&entry).await.unwrap(), AppendResult::Appended);
            entries.push(entry);
        }
        entries
    }

    #[tokio::test]
    async fn test_append_and_get_entry() {
        let store = SqliteStore::open_memory().unwrap();
        let entries = append_n(&store, 3).await;

        let retrieved = store.get_entry(EntryId(2)).await.unwrap().unwrap();
        assert_eq!(retrieved, entries[1]);
        assert_eq!(retrieved.recompute_hash().unwrap(), retrieved.hash);
        assert_eq!(store.get_entry(EntryId(9)).await.unwrap(), None);

        assert_eq!(store.chain_len().await.unwrap(), 3);
        assert_eq!(store.chain_tail().await.unwrap(), Some(entries[2].tail()));
    }

    #[tokio::test]
    async fn test_range_verifies() {
        let store = SqliteStore::open_memory().unwrap();
        append_n(&store, 5).await;

        let entries = store.get_entries_range(EntryId(1), EntryId(5)).await.unwrap();
        let report = verify_links(&entries, EntryId(1), EntryId(5), GENESIS_HASH).unwrap();
        assert!(report.valid);
        assert_eq!(report.checked, 5);
    }

    #[tokio::test]
    async fn test_stale_append_conflicts() {
        let store = SqliteStore::open_memory().unwrap();
        let entries = append_n(&store, 2).await;

        let stale = entry_after(Some(&entries[0].tail()), 99);
        assert_eq!(
            store.append_entry(&stale).await.unwrap(),
            AppendResult::Conflict {
                current: Some(entries[1].tail())
            }
        );

        let fresh_genesis = entry_after(None, 100);
        assert!(matches!(
            store.append_entry(&fresh_genesis).await.unwrap(),
            AppendResult::Conflict { .. }
        ));
        assert_eq!(store.chain_len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nonce_upsert() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(
            store.insert_nonce_if_absent("n-1", 2_000, 1_000).await.unwrap(),
            NonceInsert::Inserted
        );
        assert_eq!(
            store.insert_nonce_if_absent("n-1", 3_000, 1_999).await.unwrap(),
            NonceInsert::Exists
        );
        assert_eq!(
            store.insert_nonce_if_absent("n-1", 5_000, 2_000).await.unwrap(),
            NonceInsert::Inserted
        );
    }

    #[tokio::test]
    async fn test_window_counter() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.increment_window("c", 1_000, 0).await.unwrap(), 1);
        assert_eq!(store.increment_window("c", 1_000, 10).await.unwrap(), 2);
        assert_eq!(store.increment_window("c", 1_000, 999).await.unwrap(), 3);
        assert_eq!(store.increment_window("c", 1_000, 1_000).await.unwrap(), 1);
        assert_eq!(store.increment_window("c", 1_000, 1_500).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge() {
        let store = SqliteStore::open_memory().unwrap();
        store.insert_nonce_if_absent("a", 100, 0).await.unwrap();
        store.insert_nonce_if_absent("b", 500, 0).await.unwrap();
        store.increment_window("c", 100, 0).await.unwrap();

        assert_eq!(store.purge_expired(100).await.unwrap(), 2);
        assert_eq!(store.purge_expired(500).await.unwrap(), 1);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_tampered_row_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.db");
        let store = SqliteStore::open(&path).unwrap();
        append_n(&store, 3).await;

        // Rewrite entry 2 behind the store's back
        let raw = Connection::open(&path).unwrap();
        raw.busy_timeout(BUSY_TIMEOUT).unwrap();
        let forged = encode_value(&json!({"n": 2, "forged": true})).unwrap();
        raw.execute(
            "UPDATE audit_entries SET payload = ?1 WHERE id = 2",
            params![forged],
        )
        .unwrap();

        let entries = store.get_entries_range(EntryId(1), EntryId(3)).await.unwrap();
        let report = verify_links(&entries, EntryId(1), EntryId(3), GENESIS_HASH).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_break.unwrap().id(), EntryId(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_share_one_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let a = SqliteStore::open(&path).unwrap();
        let b = SqliteStore::open(&path).unwrap();

        let mut handles = Vec::new();
        for (worker, store) in [a.clone(), b.clone(), a.clone(), b.clone()].into_iter().enumerate() {
            handles.push(tokio::spawn(async move {
                let mut appended = 0u64;
                while appended < 10 {
                    let tail = store.chain_tail().await.unwrap();
                    let (id, prev) = ChainTail::successor(tail.as_ref());
                    let entry = AuditEntry::seal(
                        id,
                        json!({"worker": worker, "i": appended}),
                        json!({}),
                        prev,
                        0,
                    )
                    .unwrap();
                    if store.append_entry(&entry).await.unwrap() == AppendResult::Appended {
                        appended += 1;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(a.chain_len().await.unwrap(), 40);
        let entries = b.get_entries_range(EntryId(1), EntryId(40)).await.unwrap();
        let report = verify_links(&entries, EntryId(1), EntryId(40), GENESIS_HASH).unwrap();
        assert!(report.valid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_handles_admit_nonce_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonces.db");
        let a = SqliteStore::open(&path).unwrap();
        let b = SqliteStore::open(&path).unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                store.insert_nonce_if_absent("one-shot-nonce-0001", 60_000, 0).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap() == NonceInsert::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }
}
