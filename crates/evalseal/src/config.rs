//! Engine configuration.
//!
//! Loaded once at startup into immutable snapshots.

use std::time::Duration;

use evalseal_core::FreshnessPolicy;
use thiserror::Error;

/// Inconsistent engine settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Nonces would expire while the request carrying them is still fresh.
    #[error("replay ttl ceiling {ttl_ceiling_ms}ms is below the freshness window {required_ms}ms")]
    ReplayTtlTooShort { ttl_ceiling_ms: i64, required_ms: i64 },
}

/// Configuration for the Engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Timestamp bounds.
    pub freshness: FreshnessPolicy,
    /// Nonce admission.
    pub replay: ReplayConfig,
    /// Per-client request budget.
    pub rate_limit: RateLimitConfig,
    /// Audit chain appends.
    pub chain: ChainConfig,
    /// Deadline for every store call.
    pub store_timeout: StoreTimeout,
}

impl EngineConfig {
    /// Shortest nonce lifetime that outlives every timestamp freshness accepts.
    pub fn replay_ttl_floor_ms(&self) -> i64 {
        self.freshness.replay_window_ms(self.freshness.max_age_ceiling_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required_ms = self.replay_ttl_floor_ms();
        if self.replay.ttl_ceiling_ms < required_ms {
            return Err(ConfigError::ReplayTtlTooShort {
                ttl_ceiling_ms: self.replay.ttl_ceiling_ms,
                required_ms,
            });
        }
        Ok(())
    }

    /// Raise the replay ttl ceiling to the freshness window if it falls short.
    pub(crate) fn with_replay_floor(mut self) -> Self {
        let floor = self.replay_ttl_floor_ms();
        if self.replay.ttl_ceiling_ms < floor {
            tracing::warn!(
                ttl_ceiling_ms = self.replay.ttl_ceiling_ms,
                floor_ms = floor,
                "replay ttl ceiling raised to cover the freshness window"
            );
            self.replay.ttl_ceiling_ms = floor;
        }
        self
    }
}

/// Nonce admission settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    pub min_nonce_len: usize,
    pub max_nonce_len: usize,
    /// Longest lifetime a nonce record may be given.
    pub ttl_ceiling_ms: i64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        let freshness = FreshnessPolicy::default();
        Self {
            min_nonce_len: 16,
            max_nonce_len: 256,
            ttl_ceiling_ms: freshness.replay_window_ms(freshness.max_age_ceiling_ms),
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub window_ms: i64,
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max_requests: 60,
        }
    }
}

/// Audit chain settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    /// Compare-and-swap attempts before an append gives up.
    pub max_append_attempts: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_append_attempts: 16,
        }
    }
}

/// Deadline applied to each store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimeout(pub Duration);

impl Default for StoreTimeout {
    fn default() -> Self {
        Self(Duration::from_secs(2))
    }
}

impl StoreTimeout {
    /// Run a store call under this deadline.
    ///
    /// An elapsed deadline is `StorageUnavailable`; store errors pass through.
    pub(crate) async fn run<T, F>(self, op: &'static str, fut: F) -> crate::Result<T>
    where
        F: std::future::Future<Output = evalseal_store::Result<T>>,
    {
        match tokio::time::timeout(self.0, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op, error = %e, "store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(op, timeout_ms = self.0.as_millis() as u64, "store call timed out");
                Err(crate::EngineError::StorageUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.0.as_millis()
                )))
            }
        }
    }
}
