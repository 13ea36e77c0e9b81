//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::{Connection, TransactionBehavior};

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent, and safe to run from several processes
/// opening the same file: the version check and the migrations share one
/// write transaction.
pub fn migrate(conn: &mut Connection, now: i64) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current: u32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    for version in (current + 1)..=CURRENT_VERSION {
        apply_migration(&tx, version)?;

        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, now],
        )?;
        tracing::debug!(version, "applied schema migration");
    }

    tx.commit()?;
    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Replay nonces, live until expires_at
        CREATE TABLE nonces (
            value TEXT PRIMARY KEY,
            expires_at INTEGER NOT NULL         -- Unix ms
        );

        -- Fixed-window rate counters
        CREATE TABLE rate_counters (
            client_key TEXT PRIMARY KEY,
            count INTEGER NOT NULL,
            window_expires_at INTEGER NOT NULL  -- Unix ms
        );

        -- Audit chain entries
        CREATE TABLE audit_entries (
            id INTEGER PRIMARY KEY,             -- 1-based chain position
            payload BLOB NOT NULL,              -- CBOR
            result BLOB NOT NULL,               -- CBOR
            previous_hash BLOB NOT NULL,        -- 32 bytes
            hash BLOB NOT NULL,                 -- 32 bytes
            signature_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL         -- Unix ms
        );

        -- Single-row tail pointer, advanced by compare-and-swap
        CREATE TABLE chain_tail (
            singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
            id INTEGER NOT NULL,
            hash BLOB NOT NULL
        );

        CREATE INDEX idx_nonces_expires ON nonces(expires_at);
        CREATE INDEX idx_rate_counters_expires ON rate_counters(window_expires_at);
        "#,
    )?;

    Ok(())
}
