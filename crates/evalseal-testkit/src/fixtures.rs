//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rand::RngCore;
use serde_json::json;

use evalseal::{Engine, EngineConfig, EvaluationRequest};
use evalseal_core::{rfc3339_from_millis, Clock, KeyRegistry, ManualClock, Payload};
use evalseal_store::{MemoryStore, Store};

/// Clock start for fixtures: 2025-01-14T16:00:00Z.
pub const FIXTURE_NOW: i64 = 1_736_870_400_000;

/// Two keys, so rotation can be exercised.
pub const FIXTURE_KEYS: &str = "k1:fixture-secret-one,k2:fixture-secret-two";

/// Build the fixture registry with `active` as the signing key.
pub fn test_registry(active: &str) -> Arc<KeyRegistry> {
    Arc::new(KeyRegistry::parse(FIXTURE_KEYS, active).expect("fixture keys are valid"))
}

/// The input that scores exactly 87.5.
pub fn reference_input() -> Payload {
    json!({
        "epistemic": 0.8,
        "structural": 0.9,
        "risk": 0.1,
        "ethical": 0.95,
        "user": "alice"
    })
}

/// A 32-character hex nonce from the thread RNG.
pub fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// An engine over a store, a fixed registry, and a manual clock.
pub struct TestFixture<S: Store = MemoryStore> {
    pub registry: Arc<KeyRegistry>,
    pub store: Arc<S>,
    pub clock: Arc<ManualClock>,
    pub engine: Engine<S>,
}

impl TestFixture<MemoryStore> {
    /// Memory store, key `k1` active, default config.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), "k1", config)
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> TestFixture<S> {
    /// Wire an engine over `store` with `active_key` signing.
    pub fn with_store(store: Arc<S>, active_key: &str, config: EngineConfig) -> Self {
        let registry = test_registry(active_key);
        let clock = Arc::new(ManualClock::new(FIXTURE_NOW));
        let engine = Engine::new(registry.clone(), store.clone(), clock.clone(), config);
        Self {
            registry,
            store,
            clock,
            engine,
        }
    }

    /// A fresh request for `input`: stamped half a second ago, 30s max age,
    /// random nonce.
    pub fn request(&self, input: Payload) -> EvaluationRequest {
        EvaluationRequest {
            input,
            timestamp: rfc3339_from_millis(self.clock.now_millis() - 500),
            max_age_ms: Some(30_000),
            nonce: Some(random_nonce()),
        }
    }
}
