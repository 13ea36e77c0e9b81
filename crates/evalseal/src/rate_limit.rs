//! Fixed-window rate limiting per client.
//!
//! A burst straddling a window boundary can see up to twice the budget in
//! quick succession. That is inherent to fixed windows and accepted.

use std::sync::Arc;

use evalseal_core::Clock;
use evalseal_store::GuardStore;

use crate::config::{RateLimitConfig, StoreTimeout};
use crate::error::{EngineError, Result};

/// Counts requests per client key in fixed windows.
pub struct RateLimiter<S: GuardStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    timeout: StoreTimeout,
}

impl<S: GuardStore> RateLimiter<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RateLimitConfig, timeout: StoreTimeout) -> Self {
        Self {
            store,
            clock,
            config,
            timeout,
        }
    }

    /// Count one request for `client_key`. Returns the count in this window.
    pub async fn admit(&self, client_key: &str) -> Result<u64> {
        let now = self.clock.now_millis();
        let count = self
            .timeout
            .run(
                "increment_window",
                self.store.increment_window(client_key, self.config.window_ms, now),
            )
            .await?;

        if count > self.config.max_requests {
            tracing::warn!(
                client = %client_key,
                count,
                max = self.config.max_requests,
                window_ms = self.config.window_ms,
                "rate limit exceeded"
            );
            return Err(EngineError::RateLimited {
                count,
                max: self.config.max_requests,
            });
        }

        Ok(count)
    }
}
