//! # evalseal server
//!
//! HTTP front end for the evalseal engine.
//!
//! | Route | |
//! |---|---|
//! | `POST /evaluate` | run an evaluation; client identity from `x-client-id` |
//! | `POST /verify` | stateless envelope verification |
//! | `GET /verify/{id}` | re-verify a persisted audit entry |
//! | `GET /chain/verify?from=&to=` | walk the audit chain |
//! | `GET /health` | store reachability, 503 when unreachable |

pub mod routes;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;

use evalseal::store::Store;
use evalseal::Engine;

pub use routes::{router, ApiError, ErrorResponse, ANONYMOUS_CLIENT, CLIENT_ID_HEADER};
pub use settings::Settings;

/// Periodically drop expired nonces and stale rate windows.
pub fn spawn_purge<S: Store + 'static>(
    engine: Arc<Engine<S>>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = engine.purge_expired().await {
                tracing::warn!(error = %e, "purge of expired guard records failed");
            }
        }
    })
}
