//! Startup configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use evalseal::core::{FreshnessPolicy, KeyConfigError, KeyRegistry};
use evalseal::{ChainConfig, ConfigError, EngineConfig, RateLimitConfig, ReplayConfig, StoreTimeout};

/// evalseal HTTP server.
#[derive(Parser, Clone)]
#[command(name = "evalseal-server", version, about)]
pub struct Settings {
    /// Signing keys as `id:secret[,id:secret...]`.
    #[arg(long, env = "EVALSEAL_KEYS", hide_env_values = true)]
    pub keys: String,

    /// Key id used for new signatures.
    #[arg(long, env = "EVALSEAL_ACTIVE_KEY")]
    pub active_key: String,

    /// SQLite database file shared by every instance.
    #[arg(long, env = "EVALSEAL_DB", default_value = "evalseal.db")]
    pub db: PathBuf,

    #[arg(long, env = "EVALSEAL_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Rate-limit window length.
    #[arg(long, env = "EVALSEAL_RATE_WINDOW_MS", default_value_t = 60_000,
          value_parser = clap::value_parser!(i64).range(1..))]
    pub rate_window_ms: i64,

    /// Requests allowed per client per window.
    #[arg(long, env = "EVALSEAL_RATE_MAX", default_value_t = 60)]
    pub rate_max: u64,

    /// Largest `max_age_ms` a request may ask for.
    #[arg(long, env = "EVALSEAL_MAX_AGE_CEILING_MS", default_value_t = 60_000,
          value_parser = clap::value_parser!(i64).range(1..))]
    pub max_age_ceiling_ms: i64,

    /// Allowed clock skew for timestamps ahead of the server.
    #[arg(long, env = "EVALSEAL_FUTURE_DRIFT_MS", default_value_t = 5_000,
          value_parser = clap::value_parser!(i64).range(0..))]
    pub future_drift_ms: i64,

    /// Longest lifetime given to a nonce record.
    #[arg(long, env = "EVALSEAL_REPLAY_TTL_CEILING_MS", default_value_t = 65_000,
          value_parser = clap::value_parser!(i64).range(1..))]
    pub replay_ttl_ceiling_ms: i64,

    /// Deadline for each store call.
    #[arg(long, env = "EVALSEAL_STORE_TIMEOUT_MS", default_value_t = 2_000)]
    pub store_timeout_ms: u64,

    /// Seconds between purges of expired nonces and rate windows. 0 disables.
    #[arg(long, env = "EVALSEAL_PURGE_INTERVAL_SECS", default_value_t = 60)]
    pub purge_interval_secs: u64,
}

impl Settings {
    /// Validate the key set.
    pub fn registry(&self) -> Result<KeyRegistry, KeyConfigError> {
        KeyRegistry::parse(&self.keys, &self.active_key)
    }

    /// Build the engine settings, rejecting a replay ttl ceiling shorter
    /// than the freshness window.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let defaults = ReplayConfig::default();
        let config = EngineConfig {
            freshness: FreshnessPolicy {
                max_age_ceiling_ms: self.max_age_ceiling_ms,
                future_drift_ms: self.future_drift_ms,
            },
            replay: ReplayConfig {
                ttl_ceiling_ms: self.replay_ttl_ceiling_ms,
                ..defaults
            },
            rate_limit: RateLimitConfig {
                window_ms: self.rate_window_ms,
                max_requests: self.rate_max,
            },
            chain: ChainConfig::default(),
            store_timeout: StoreTimeout(Duration::from_millis(self.store_timeout_ms)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_secs > 0).then(|| Duration::from_secs(self.purge_interval_secs))
    }
}
