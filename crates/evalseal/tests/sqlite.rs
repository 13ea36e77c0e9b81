//! The engine over SQLite: persistence, tamper detection from outside the
//! process, and several handles sharing one database file.

use std::sync::Arc;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use evalseal::store::{ChainStore, SqliteStore};
use evalseal::{ChainBreak, ChainConfig, EngineConfig, EngineError, EntryId};
use evalseal_testkit::{random_nonce, reference_input, TestFixture};

fn open(dir: &TempDir) -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open(dir.path().join("audit.db")).unwrap())
}

async fn seal(fixture: &TestFixture<SqliteStore>, count: usize) {
    for _ in 0..count {
        fixture
            .engine
            .evaluate("client-a", fixture.request(reference_input()))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn chain_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let fixture = TestFixture::with_store(open(&dir), "k1", EngineConfig::default());
        seal(&fixture, 3).await;
    }

    let fixture = TestFixture::with_store(open(&dir), "k1", EngineConfig::default());
    assert_eq!(fixture.store.chain_len().await.unwrap(), 3);
    seal(&fixture, 1).await;

    let report = fixture.engine.verify_chain(None, None).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.checked, 4);
    assert!(fixture.engine.verify_entry(EntryId(4)).await.unwrap().valid);
}

#[tokio::test]
async fn swapped_result_blob_is_detected() {
    let dir = TempDir::new().unwrap();
    let fixture = TestFixture::with_store(open(&dir), "k1", EngineConfig::default());
    seal(&fixture, 3).await;

    let conn = Connection::open(dir.path().join("audit.db")).unwrap();
    conn.execute(
        "UPDATE audit_entries SET result = (SELECT result FROM audit_entries WHERE id = 1) WHERE id = 2",
        [],
    )
    .unwrap();

    let report = fixture.engine.verify_chain(None, None).await.unwrap();
    assert!(!report.valid);
    assert_eq!(report.checked, 1);
    assert!(matches!(
        report.first_break,
        Some(ChainBreak::ContentMismatch { id, .. }) if id == EntryId(2)
    ));

    let entry = fixture.engine.verify_entry(EntryId(2)).await.unwrap();
    assert!(!entry.valid);
    assert!(!entry.content.valid);
    let signature = entry.signature.unwrap();
    assert!(signature.checks.key_found);
    assert!(!signature.checks.input_hash_match);

    // Entries outside the damaged range still check out.
    let tail = fixture
        .engine
        .verify_chain(Some(EntryId(3)), None)
        .await
        .unwrap();
    assert!(tail.valid);
}

#[tokio::test]
async fn deleted_row_is_detected() {
    let dir = TempDir::new().unwrap();
    let fixture = TestFixture::with_store(open(&dir), "k1", EngineConfig::default());
    seal(&fixture, 4).await;

    let conn = Connection::open(dir.path().join("audit.db")).unwrap();
    conn.execute("DELETE FROM audit_entries WHERE id = ?1", params![3])
        .unwrap();

    let report = fixture.engine.verify_chain(None, None).await.unwrap();
    assert_eq!(report.first_break, Some(ChainBreak::Missing { id: EntryId(3) }));

    assert!(matches!(
        fixture.engine.verify_entry(EntryId(3)).await,
        Err(EngineError::EntryNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_handles_build_one_chain() {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        chain: ChainConfig {
            max_append_attempts: 1_000,
        },
        ..EngineConfig::default()
    };

    let a = Arc::new(TestFixture::with_store(open(&dir), "k1", config.clone()));
    let b = Arc::new(TestFixture::with_store(open(&dir), "k2", config));

    let mut tasks = Vec::new();
    for (i, fixture) in [a.clone(), b.clone(), a.clone(), b.clone()].into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            let client = format!("client-{i}");
            for _ in 0..10 {
                fixture
                    .engine
                    .evaluate(&client, fixture.request(reference_input()))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(a.store.chain_len().await.unwrap(), 40);
    let report = b.engine.verify_chain(None, None).await.unwrap();
    assert!(report.valid);
    assert_eq!(report.checked, 40);

    let entries = a
        .store
        .get_entries_range(EntryId(1), EntryId(40))
        .await
        .unwrap();
    let ids: Vec<u64> = entries.iter().map(|e| e.id.get()).collect();
    assert_eq!(ids, (1..=40).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_nonce_admitted_once_across_handles() {
    let dir = TempDir::new().unwrap();
    let a = Arc::new(TestFixture::with_store(open(&dir), "k1", EngineConfig::default()));
    let b = Arc::new(TestFixture::with_store(open(&dir), "k1", EngineConfig::default()));
    let nonce = random_nonce();

    let mut tasks = Vec::new();
    for fixture in [a.clone(), b.clone(), a.clone(), b.clone()] {
        let mut request = fixture.request(reference_input());
        request.nonce = Some(nonce.clone());
        tasks.push(tokio::spawn(async move {
            fixture.engine.evaluate("client-a", request).await
        }));
    }

    let mut admitted = 0;
    let mut replayed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(EngineError::ReplayDetected) => replayed += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(replayed, 3);
    assert_eq!(a.store.chain_len().await.unwrap(), 1);
}
