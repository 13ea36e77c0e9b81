//! Replay protection: single-use nonce admission.

use std::sync::Arc;

use evalseal_core::Clock;
use evalseal_store::{GuardStore, NonceInsert};

use crate::config::{ReplayConfig, StoreTimeout};
use crate::error::{EngineError, Result};

/// Admits each nonce at most once within its lifetime.
pub struct ReplayGuard<S: GuardStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ReplayConfig,
    timeout: StoreTimeout,
}

impl<S: GuardStore> ReplayGuard<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: ReplayConfig, timeout: StoreTimeout) -> Self {
        Self {
            store,
            clock,
            config,
            timeout,
        }
    }

    /// Reject nonces that could never be admitted, without touching the store.
    pub fn check_nonce(&self, nonce: &str) -> Result<()> {
        let len = nonce.chars().count();
        if len < self.config.min_nonce_len {
            return Err(EngineError::InvalidNonce(format!(
                "nonce must be at least {} characters",
                self.config.min_nonce_len
            )));
        }
        if len > self.config.max_nonce_len {
            return Err(EngineError::InvalidNonce(format!(
                "nonce must be at most {} characters",
                self.config.max_nonce_len
            )));
        }
        if nonce.chars().any(char::is_control) {
            return Err(EngineError::InvalidNonce("nonce contains control characters".into()));
        }
        Ok(())
    }

    /// Admit `nonce` for `ttl_ms` milliseconds (clamped to the ceiling).
    pub async fn admit(&self, nonce: &str, ttl_ms: i64) -> Result<()> {
        self.check_nonce(nonce)?;
        if ttl_ms <= 0 {
            return Err(EngineError::InvalidNonce("nonce ttl must be positive".into()));
        }

        let ttl_ms = ttl_ms.min(self.config.ttl_ceiling_ms);
        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(ttl_ms);

        let outcome = self
            .timeout
            .run("insert_nonce", self.store.insert_nonce_if_absent(nonce, expires_at, now))
            .await?;

        match outcome {
            NonceInsert::Inserted => {
                tracing::debug!(ttl_ms, "nonce admitted");
                Ok(())
            }
            NonceInsert::Exists => {
                tracing::warn!(nonce_len = nonce.len(), "replayed nonce rejected");
                Err(EngineError::ReplayDetected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalseal_core::ManualClock;
    use evalseal_store::MemoryStore;

    const NONCE: &str = "0123456789abcdef";

    fn guard() -> (ReplayGuard<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let guard = ReplayGuard::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            ReplayConfig::default(),
            StoreTimeout::default(),
        );
        (guard, clock)
    }

    #[tokio::test]
    async fn test_admit_once() {
        let (guard, _) = guard();
        guard.admit(NONCE, 10_000).await.unwrap();
        assert!(matches!(guard.admit(NONCE, 10_000).await, Err(EngineError::ReplayDetected)));
    }

    #[tokio::test]
    async fn test_admit_again_after_ttl() {
        let (guard, clock) = guard();
        guard.admit(NONCE, 10_000).await.unwrap();

        clock.advance(9_999);
        assert!(guard.admit(NONCE, 10_000).await.is_err());

        clock.advance(1);
        guard.admit(NONCE, 10_000).await.unwrap();
    }

    #[tokio::test]
    async fn test_ttl_clamped_to_ceiling() {
        let (guard, clock) = guard();
        guard.admit(NONCE, i64::MAX).await.unwrap();

        clock.advance(ReplayConfig::default().ttl_ceiling_ms);
        guard.admit(NONCE, 1_000).await.unwrap();
    }

    #[tokio::test]
    async fn test_static_rejections() {
        let (guard, _) = guard();
        let long = "x".repeat(257);
        for bad in ["", "short", "0123456789abcde\n", long.as_str()] {
            assert!(
                matches!(guard.admit(bad, 1_000).await, Err(EngineError::InvalidNonce(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(matches!(guard.admit(NONCE, 0).await, Err(EngineError::InvalidNonce(_))));
    }

    #[tokio::test]
    async fn test_rejected_nonce_never_stored() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let guard = ReplayGuard::new(store.clone(), clock, ReplayConfig::default(), StoreTimeout::default());

        assert!(guard.admit("tiny", 1_000).await.is_err());
        assert_eq!(store.purge_expired(i64::MAX).await.unwrap(), 0);
    }
}
