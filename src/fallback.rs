//! Degraded-mode limiter used while the backing store is unreachable.
//!
//! State here is process-local by design: during an outage each gateway
//! instance enforces on its own, so accuracy under horizontal scale-out is
//! explicitly best-effort. Quota consumed locally is never reconciled back
//! into the shared store; after recovery the shared state picks up from its
//! last committed value.

use crate::clock::Clock;
use crate::decision::{Decision, DenyReason};
use crate::rule::{FallbackPolicy, RateLimitRule};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct LocalBucket {
    tokens: f64,
    last_refill_at: f64,
    expires_at: f64,
}

/// In-process limiter consulted only when store calls fail or time out.
///
/// Always runs a token bucket regardless of the rule's configured
/// algorithm; the exact-log and blended-counter variants buy nothing once
/// accuracy is already down to one process's view. Buckets carry the same
/// TTL the shared store would have used, so idle keys are reclaimed here
/// too instead of accumulating across outages.
#[derive(Debug)]
pub struct FallbackLimiter {
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, LocalBucket>>,
}

impl FallbackLimiter {
    /// Limiter reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, buckets: Mutex::new(HashMap::new()) }
    }

    /// Decide `cost` against `rule` per its fallback policy, keyed by the
    /// same storage key (and the same TTL) the shared store would have
    /// used.
    pub fn check(
        &self,
        storage_key: &str,
        rule: &RateLimitRule,
        cost: u32,
        ttl: Duration,
    ) -> Decision {
        match rule.fallback() {
            FallbackPolicy::FailOpen => Decision::Allowed { remaining: rule.limit() },
            FallbackPolicy::FailClosed => Decision::Denied {
                retry_after: rule.window(),
                reason: DenyReason::Degraded,
            },
            FallbackPolicy::LocalApproximate => {
                self.local_token_bucket(storage_key, rule, cost, ttl)
            }
        }
    }

    fn local_token_bucket(
        &self,
        storage_key: &str,
        rule: &RateLimitRule,
        cost: u32,
        ttl: Duration,
    ) -> Decision {
        let now = self.clock.now();
        let capacity = f64::from(rule.limit());
        let rate = rule.refill_rate();
        let cost_f = f64::from(cost);
        let expires_at = now + ttl.as_secs_f64();

        let mut guard = self.buckets.lock().unwrap();
        // Same reclamation the shared store performs on its side.
        guard.retain(|_, bucket| bucket.expires_at > now);

        let bucket = guard.entry(storage_key.to_string()).or_insert(LocalBucket {
            tokens: capacity,
            last_refill_at: now,
            expires_at,
        });

        let elapsed = (now - bucket.last_refill_at).max(0.0);
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill_at = now;
        bucket.expires_at = expires_at;

        if bucket.tokens >= cost_f {
            bucket.tokens -= cost_f;
            Decision::Allowed { remaining: bucket.tokens.floor() as u32 }
        } else {
            let wait = (cost_f - bucket.tokens) / rate;
            Decision::Denied {
                retry_after: Duration::from_secs_f64(wait),
                reason: DenyReason::RateExceeded,
            }
        }
    }
}
