//! Error types for the admission-control engine.
//!
//! Only [`ConfigError`] is ever surfaced to callers as a hard error, and only
//! at rule-construction/resolution time. Everything that can go wrong on the
//! hot path (store outage, CAS contention, timeout) degrades to a
//! [`Decision`](crate::Decision) via the fallback limiter instead of failing
//! the call.

use std::time::Duration;
use thiserror::Error;

/// A rule or check input that is invalid by construction.
///
/// Raised synchronously when a rule is built or resolved, never mid-check
/// against the backing store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `limit` must be greater than zero.
    #[error("limit must be greater than zero")]
    NonPositiveLimit,
    /// `window` must be a positive duration.
    #[error("window must be greater than zero (got {seconds}s)")]
    NonPositiveWindow {
        /// The offending window length in seconds.
        seconds: f64,
    },
    /// `cost_per_request` (or a check's cost) must be at least 1.
    #[error("cost must be at least 1")]
    ZeroCost,
    /// Sharding splits a counter into independent sub-counters, which has no
    /// meaning for the exact per-request log.
    #[error("sliding window log cannot be sharded (shards = {shards})")]
    ShardedWindowLog {
        /// The configured shard count.
        shards: u32,
    },
}

/// Failure talking to the shared backing store.
///
/// Never propagated to callers; the engine logs it and consults the
/// per-rule fallback policy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at all.
    #[error("backing store unreachable: {0}")]
    Unavailable(String),
    /// The round trip exceeded the caller-supplied deadline.
    #[error("backing store call exceeded {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
    /// The optimistic-write budget ran out on a contended key.
    #[error("compare-and-swap budget exhausted after {attempts} attempts")]
    ContentionExceeded {
        /// How many read-compute-write rounds were attempted.
        attempts: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::NonPositiveWindow { seconds: -1.5 };
        assert!(err.to_string().contains("-1.5"));
        assert_eq!(ConfigError::NonPositiveLimit.to_string(), "limit must be greater than zero");
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::ContentionExceeded { attempts: 5 };
        assert!(err.to_string().contains("5 attempts"));

        let err = StoreError::Timeout { timeout: Duration::from_millis(3) };
        assert!(err.to_string().contains("3ms"));
    }
}
