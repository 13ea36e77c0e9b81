//! The Engine: the evaluation pipeline and its verification surface.
//!
//! An evaluation passes freshness, input parsing, replay, and rate-limit
//! gates before anything is scored. The signed result is appended to the
//! audit chain before the caller sees it; a failed append fails the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use evalseal_core::{
    AuditEntry, ChainReport, Clock, CoreError, EntryId, EntryVerification, KeyRegistry, Payload,
    Sha256Hash, SignedRecord, Signer, VerificationReport,
};
use evalseal_store::Store;

use crate::chain::AuditChain;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::evaluation::{compute_score, evaluate_governance, EvaluationInput};
use crate::rate_limit::RateLimiter;
use crate::replay::ReplayGuard;

/// An evaluation request as received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    #[serde(default)]
    pub input: Payload,
    /// RFC 3339 request time.
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub max_age_ms: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Where an evaluation landed in the audit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRef {
    pub id: EntryId,
    pub hash: Sha256Hash,
    pub signature_version: u16,
}

/// A sealed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub result: Payload,
    pub governance: Payload,
    pub signature: SignedRecord,
    pub audit: AuditRef,
}

impl Evaluation {
    /// The parts a client keeps for later stateless verification.
    pub fn envelope(&self, input: Payload) -> Envelope {
        Envelope {
            input,
            result: self.result.clone(),
            governance: self.governance.clone(),
            signature: self.signature.clone(),
        }
    }
}

/// A previously issued evaluation, presented for re-verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub input: Payload,
    pub result: Payload,
    pub governance: Payload,
    pub signature: SignedRecord,
}

/// Verification of a persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryReport {
    pub id: EntryId,
    /// Content hash and stored signature both check out.
    pub valid: bool,
    pub content: EntryVerification,
    /// `None` when the stored result does not carry a readable signature.
    pub signature: Option<VerificationReport>,
}

/// Liveness snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub store_reachable: bool,
    pub chain_len: Option<u64>,
    pub active_key_id: String,
}

/// The evaluation engine.
pub struct Engine<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    signer: Signer,
    replay: ReplayGuard<S>,
    rate_limiter: RateLimiter<S>,
    chain: AuditChain<S>,
}

impl<S: Store> Engine<S> {
    /// Create an engine over a key registry snapshot and a store.
    ///
    /// A replay ttl ceiling shorter than the freshness window is raised to it.
    pub fn new(
        registry: Arc<KeyRegistry>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let config = config.with_replay_floor();
        let timeout = config.store_timeout;
        Self {
            signer: Signer::new(registry, clock.clone()),
            replay: ReplayGuard::new(store.clone(), clock.clone(), config.replay, timeout),
            rate_limiter: RateLimiter::new(store.clone(), clock.clone(), config.rate_limit, timeout),
            chain: AuditChain::new(store.clone(), clock.clone(), config.chain, timeout),
            store,
            clock,
            config,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn chain(&self) -> &AuditChain<S> {
        &self.chain
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one evaluation on behalf of `client_id`.
    pub async fn evaluate(&self, client_id: &str, request: EvaluationRequest) -> Result<Evaluation> {
        let fresh = self.config.freshness.validate(
            request.timestamp.as_deref(),
            request.max_age_ms,
            self.clock.now_millis(),
        )?;

        let scoring_input = EvaluationInput::from_payload(&request.input)?;

        let nonce = request
            .nonce
            .as_deref()
            .ok_or_else(|| EngineError::Validation("nonce is required".into()))?;
        self.replay.check_nonce(nonce)?;

        if client_id.is_empty() {
            return Err(EngineError::Validation("client id must not be empty".into()));
        }

        // Shared state from here on.
        self.replay
            .admit(nonce, self.config.freshness.replay_window_ms(fresh.max_age_ms))
            .await?;
        self.rate_limiter.admit(client_id).await?;

        let score = compute_score(&scoring_input);
        let result = to_payload(&score)?;
        let governance = to_payload(&evaluate_governance(&request.input))?;

        let signature = self
            .signer
            .build(&request.input, &result, &governance)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to sign evaluation");
                EngineError::from(e)
            })?;

        let sealed = json!({
            "result": result,
            "governance": governance,
            "signature": to_payload(&signature)?,
        });
        let entry = self.chain.append(request.input, sealed).await?;

        tracing::info!(
            client = %client_id,
            audit_id = %entry.id,
            key_id = %signature.key_id,
            rationality_score = score.rationality_score,
            "evaluation sealed"
        );

        Ok(Evaluation {
            result,
            governance,
            signature,
            audit: AuditRef {
                id: entry.id,
                hash: entry.hash,
                signature_version: entry.signature_version,
            },
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-verify an envelope against the key registry. Touches no state.
    pub fn verify_envelope(&self, envelope: &Envelope) -> Result<VerificationReport> {
        let report = self.signer.verify(
            &envelope.input,
            &envelope.result,
            &envelope.governance,
            &envelope.signature,
        )?;
        if !report.valid {
            tracing::debug!(key_id = %envelope.signature.key_id, checks = ?report.checks, "envelope failed verification");
        }
        Ok(report)
    }

    /// Re-verify a persisted entry: its content hash and the signature it carries.
    pub async fn verify_entry(&self, id: EntryId) -> Result<EntryReport> {
        let entry = self.chain.get(id).await?;
        let content = evalseal_core::verify_entry(&entry)?;
        let signature = self.verify_stored_signature(&entry)?;

        let valid = content.valid && signature.map(|s| s.valid).unwrap_or(false);
        if !valid {
            tracing::warn!(id = %id, content_valid = content.valid, "audit entry failed verification");
        }

        Ok(EntryReport {
            id,
            valid,
            content,
            signature,
        })
    }

    fn verify_stored_signature(&self, entry: &AuditEntry) -> Result<Option<VerificationReport>> {
        let (Some(result), Some(governance), Some(signature)) = (
            entry.result.get("result"),
            entry.result.get("governance"),
            entry.result.get("signature"),
        ) else {
            return Ok(None);
        };

        let record: SignedRecord = match serde_json::from_value(signature.clone()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "stored signature is unreadable");
                return Ok(None);
            }
        };

        let report = self.signer.verify(&entry.payload, result, governance, &record)?;
        Ok(Some(report))
    }

    /// Walk the chain over `from..=to`, defaulting to all of it.
    pub async fn verify_chain(&self, from: Option<EntryId>, to: Option<EntryId>) -> Result<ChainReport> {
        self.chain.verify_chain(from, to).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Ping the store and report chain length and the active key.
    pub async fn health(&self) -> HealthReport {
        let timeout = self.config.store_timeout;
        let store_reachable = timeout.run("ping", self.store.ping()).await.is_ok();
        let chain_len = if store_reachable {
            self.chain.len().await.ok()
        } else {
            None
        };

        HealthReport {
            store_reachable,
            chain_len,
            active_key_id: self.signer.registry().active_id().to_string(),
        }
    }

    /// Drop expired nonces and stale rate windows.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now_millis();
        let removed = self
            .config
            .store_timeout
            .run("purge_expired", self.store.purge_expired(now))
            .await?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired guard records");
        }
        Ok(removed)
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Payload> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(error = %e, "failed to encode payload");
        EngineError::Core(CoreError::EncodingError(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalseal_core::{rfc3339_from_millis, FreshnessError, ManualClock, SIGNATURE_VERSION};
    use evalseal_store::{ChainStore, MemoryStore};

    const NOW: i64 = 1_736_870_400_000;

    fn engine() -> (Engine<MemoryStore>, Arc<MemoryStore>, Arc<ManualClock>) {
        let registry = Arc::new(KeyRegistry::parse("k1:unit-test-secret", "k1").unwrap());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = Engine::new(registry, store.clone(), clock.clone(), EngineConfig::default());
        (engine, store, clock)
    }

    fn request(nonce: &str) -> EvaluationRequest {
        EvaluationRequest {
            input: json!({
                "epistemic": 0.8,
                "structural": 0.9,
                "risk": 0.1,
                "ethical": 0.95,
                "user": "alice"
            }),
            timestamp: rfc3339_from_millis(NOW - 1_000),
            max_age_ms: Some(30_000),
            nonce: Some(nonce.to_string()),
        }
    }

    #[tokio::test]
    async fn test_evaluate_and_verify() {
        let (engine, _, _) = engine();
        let req = request("nonce-0000000001");
        let evaluation = engine.evaluate("client", req.clone()).await.unwrap();

        assert_eq!(evaluation.result, json!({"rationality_score": 87.5}));
        assert_eq!(evaluation.governance["governance_score"], json!(100));
        assert_eq!(evaluation.audit.id, EntryId(1));
        assert_eq!(evaluation.audit.signature_version, SIGNATURE_VERSION);
        assert_eq!(evaluation.signature.timestamp, NOW);

        let report = engine.verify_envelope(&evaluation.envelope(req.input)).unwrap();
        assert!(report.valid);

        let entry = engine.verify_entry(EntryId(1)).await.unwrap();
        assert!(entry.valid);
        assert_eq!(entry.content.hash, evaluation.audit.hash);
    }

    #[tokio::test]
    async fn test_missing_nonce_is_validation() {
        let (engine, store, _) = engine();
        let mut req = request("unused");
        req.nonce = None;
        let err = engine.evaluate("client", req).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(store.chain_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stale_request_rejected_first() {
        let (engine, _, clock) = engine();
        clock.advance(60_000);
        let err = engine.evaluate("client", request("nonce-0000000002")).await.unwrap_err();
        assert!(matches!(err, EngineError::Freshness(FreshnessError::Expired { .. })));

        // The nonce was never recorded, so a fresh retry goes through.
        let mut retry = request("nonce-0000000002");
        retry.timestamp = rfc3339_from_millis(NOW + 60_000);
        engine.evaluate("client", retry).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_entry_detects_tampered_result() {
        let (engine, store, _) = engine();
        engine.evaluate("client", request("nonce-0000000003")).await.unwrap();

        let mut entry = store.get_entry(EntryId(1)).await.unwrap().unwrap();
        entry.result["result"]["rationality_score"] = json!(99.0);
        store.overwrite_entry(entry).unwrap();

        let report = engine.verify_entry(EntryId(1)).await.unwrap();
        assert!(!report.valid);
        assert!(!report.content.valid);
        assert!(!report.signature.unwrap().checks.evaluation_hash_match);
    }

    #[tokio::test]
    async fn test_verify_entry_not_found() {
        let (engine, _, _) = engine();
        assert!(matches!(
            engine.verify_entry(EntryId(7)).await,
            Err(EngineError::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_health() {
        let (engine, _, _) = engine();
        engine.evaluate("client", request("nonce-0000000004")).await.unwrap();
        let health = engine.health().await;
        assert!(health.store_reachable);
        assert_eq!(health.chain_len, Some(1));
        assert_eq!(health.active_key_id, "k1");
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (engine, _, clock) = engine();
        engine.evaluate("client", request("nonce-0000000005")).await.unwrap();
        assert_eq!(engine.purge_expired().await.unwrap(), 0);

        clock.advance(120_000);
        assert!(engine.purge_expired().await.unwrap() >= 1);
    }
}
