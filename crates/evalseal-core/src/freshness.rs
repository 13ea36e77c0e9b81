//! Request freshness validation.
//!
//! A request carries an RFC 3339 timestamp and the maximum age the caller is
//! willing to have it accepted at. Both are bounded by server policy.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::FreshnessError;

/// Server-side bounds on request freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Largest `max_age_ms` a request may ask for.
    pub max_age_ceiling_ms: i64,
    /// How far in the future a timestamp may be.
    pub future_drift_ms: i64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_ceiling_ms: 60_000,
            future_drift_ms: 5_000,
        }
    }
}

/// A request that passed freshness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshRequest {
    /// The request timestamp in Unix milliseconds.
    pub timestamp_ms: i64,
    /// The accepted `max_age_ms`.
    pub max_age_ms: i64,
}

impl FreshnessPolicy {
    /// Check a request timestamp against `now_ms`.
    pub fn validate(
        &self,
        timestamp: Option<&str>,
        max_age_ms: Option<i64>,
        now_ms: i64,
    ) -> Result<FreshRequest, FreshnessError> {
        let timestamp = timestamp
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(FreshnessError::MissingField("timestamp"))?;

        let max_age_ms = max_age_ms
            .filter(|ms| *ms > 0)
            .ok_or(FreshnessError::MissingField("max_age_ms"))?;

        if max_age_ms > self.max_age_ceiling_ms {
            return Err(FreshnessError::ConfigExceeded {
                requested: max_age_ms,
                ceiling: self.max_age_ceiling_ms,
            });
        }

        let ts_ms = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| FreshnessError::InvalidFormat(format!("{timestamp}: {e}")))?
            .timestamp_millis();

        let age_ms = now_ms.saturating_sub(ts_ms);

        if age_ms < -self.future_drift_ms {
            return Err(FreshnessError::FutureTimestamp {
                ahead_ms: -age_ms,
                drift_ms: self.future_drift_ms,
            });
        }

        if age_ms > max_age_ms {
            return Err(FreshnessError::Expired { age_ms, max_age_ms });
        }

        Ok(FreshRequest {
            timestamp_ms: ts_ms,
            max_age_ms,
        })
    }

    /// Nonce lifetime that covers every timestamp this policy could accept.
    pub fn replay_window_ms(&self, max_age_ms: i64) -> i64 {
        max_age_ms.saturating_add(self.future_drift_ms)
    }
}

/// Format Unix milliseconds as an RFC 3339 UTC timestamp.
pub fn rfc3339_from_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-01-14T16:00:00Z
    const NOW: i64 = 1_736_870_400_000;

    fn ts(offset_ms: i64) -> String {
        rfc3339_from_millis(NOW + offset_ms).unwrap()
    }

    #[test]
    fn test_fresh_request() {
        let policy = FreshnessPolicy::default();
        let stamp = ts(-1_000);
        assert_eq!(
            policy.validate(Some(&stamp), Some(30_000), NOW),
            Ok(FreshRequest {
                timestamp_ms: NOW - 1_000,
                max_age_ms: 30_000
            })
        );
    }

    #[test]
    fn test_formatting() {
        assert_eq!(ts(0), "2025-01-14T16:00:00.000Z");
    }

    #[test]
    fn test_missing_fields() {
        let policy = FreshnessPolicy::default();
        let stamp = ts(0);
        assert_eq!(
            policy.validate(None, Some(1_000), NOW),
            Err(FreshnessError::MissingField("timestamp"))
        );
        assert_eq!(
            policy.validate(Some(""), Some(1_000), NOW),
            Err(FreshnessError::MissingField("timestamp"))
        );
        assert_eq!(
            policy.validate(Some(&stamp), None, NOW),
            Err(FreshnessError::MissingField("max_age_ms"))
        );
        assert_eq!(
            policy.validate(Some(&stamp), Some(0), NOW),
            Err(FreshnessError::MissingField("max_age_ms"))
        );
    }

    #[test]
    fn test_ceiling_checked_before_format() {
        let policy = FreshnessPolicy::default();
        assert_eq!(
            policy.validate(Some("not a date"), Some(120_000), NOW),
            Err(FreshnessError::ConfigExceeded {
                requested: 120_000,
                ceiling: 60_000
            })
        );
    }

    #[test]
    fn test_invalid_format() {
        let policy = FreshnessPolicy::default();
        let result = policy.validate(Some("yesterday"), Some(1_000), NOW);
        assert!(matches!(result, Err(FreshnessError::InvalidFormat(_))));
    }

    #[test]
    fn test_future_drift_boundary() {
        let policy = FreshnessPolicy::default();
        let at_limit = ts(5_000);
        assert!(policy.validate(Some(&at_limit), Some(1_000), NOW).is_ok());

        let beyond = ts(5_001);
        assert_eq!(
            policy.validate(Some(&beyond), Some(1_000), NOW),
            Err(FreshnessError::FutureTimestamp {
                ahead_ms: 5_001,
                drift_ms: 5_000
            })
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let policy = FreshnessPolicy::default();
        let at_limit = ts(-10_000);
        assert!(policy.validate(Some(&at_limit), Some(10_000), NOW).is_ok());

        let stale = ts(-10_001);
        assert_eq!(
            policy.validate(Some(&stale), Some(10_000), NOW),
            Err(FreshnessError::Expired {
                age_ms: 10_001,
                max_age_ms: 10_000
            })
        );
    }

    #[test]
    fn test_offset_timestamps() {
        let policy = FreshnessPolicy::default();
        // Same instant as NOW, expressed at +02:00
        assert_eq!(
            policy
                .validate(Some("2025-01-14T18:00:00+02:00"), Some(1_000), NOW)
                .map(|fresh| fresh.timestamp_ms),
            Ok(NOW)
        );
    }

    #[test]
    fn test_replay_window() {
        let policy = FreshnessPolicy::default();
        assert_eq!(policy.replay_window_ms(30_000), 35_000);
    }
}
