//! # evalseal store
//!
//! Storage abstraction for evalseal. Provides trait-based interfaces for the
//! shared state behind replay protection, rate limiting, and the audit chain,
//! with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`GuardStore`] - Nonce insert-if-absent and fixed-window counters
//! - [`ChainStore`] - Compare-and-swap appends to the audit chain
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evalseal_store::{ChainStore, SqliteStore};
//!
//! async fn example() {
//!     // Open a SQLite database shared by every replica
//!     let store = SqliteStore::open("evalseal.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let tail = store.chain_tail().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Conditional nonce inserts**: an existing live nonce is never overwritten
//! - **Window-bound counters**: the increment and the window reset are one statement
//! - **CAS appends**: an entry built on a stale tail returns `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendResult, ChainStore, GuardStore, NonceInsert, Store};
