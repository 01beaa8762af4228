//! The core check: one atomic store round trip per decision, degrading to
//! the process-local fallback when the store is out.

use crate::algorithms;
use crate::clock::{Clock, SystemClock};
use crate::decision::{Decision, DenyReason};
use crate::error::ConfigError;
use crate::fallback::FallbackLimiter;
use crate::key::RateLimitKey;
use crate::rule::RateLimitRule;
use crate::store::BackingStore;
use std::sync::Arc;
use std::time::Duration;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for one store round trip; exceeding it counts as a store
    /// failure. Production deployments typically lower this to single-digit
    /// milliseconds to bound tail latency.
    pub store_timeout: Duration,
    /// Key TTL as a multiple of the rule's window, so idle keys are
    /// reclaimed by the store without explicit deletion.
    pub ttl_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { store_timeout: Duration::from_millis(100), ttl_factor: 2.0 }
    }
}

/// Executes one rule against one key via a single atomic store call.
///
/// All correctness is per key: concurrent checks on the same key serialize
/// through the store's atomic execute, and exactly one state transition is
/// visible to all callers per admission. Checks on different keys never
/// block each other.
pub struct RateLimiterEngine<S> {
    store: Arc<S>,
    fallback: FallbackLimiter,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: BackingStore> RateLimiterEngine<S> {
    /// Engine on the system clock with default tunables.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Engine reading time from `clock`; tests inject a manual clock here.
    /// The store's own clock stays authoritative for TTL expiry.
    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(store),
            fallback: FallbackLimiter::new(clock.clone()),
            clock,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine tunables.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The shared store handle.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide whether to admit `cost` units against `rule` for `key`.
    ///
    /// Returns `Err` only for invalid input (`cost == 0`); every runtime
    /// condition, including a store outage, resolves to a [`Decision`].
    /// Admission is charged at check time: a caller that abandons the
    /// request afterwards gets no refund, since refunding would reopen the
    /// race the atomic store call exists to prevent.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
        cost: u32,
    ) -> Result<Decision, ConfigError> {
        if cost == 0 {
            return Err(ConfigError::ZeroCost);
        }
        let storage_key = key.storage_key(rule);

        // A request that can never fit is decided up front; it must not
        // burn a store round trip, and operators can tell it apart from
        // ordinary exhaustion.
        if cost > rule.limit() {
            tracing::debug!(key = %storage_key, cost, limit = rule.limit(), "cost exceeds limit");
            return Ok(Decision::Denied {
                retry_after: rule.window(),
                reason: DenyReason::CostExceedsLimit,
            });
        }

        let now = self.clock.now();
        let ttl = rule.window().mul_f64(self.config.ttl_factor);
        let transform =
            |state: Option<crate::state::BucketState>| algorithms::apply(rule, cost, now, state);

        let outcome = tokio::time::timeout(
            self.config.store_timeout,
            self.store.execute_atomic(&storage_key, ttl, &transform),
        )
        .await;

        match outcome {
            Ok(Ok(decision)) => {
                if !decision.is_allowed() {
                    tracing::debug!(key = %storage_key, ?decision, "request denied");
                }
                Ok(decision)
            }
            Ok(Err(err)) => {
                tracing::warn!(key = %storage_key, error = %err, "store failed, using fallback");
                Ok(self.fallback.check(&storage_key, rule, cost, ttl))
            }
            Err(_elapsed) => {
                tracing::warn!(
                    key = %storage_key,
                    timeout = ?self.config.store_timeout,
                    "store timed out, using fallback"
                );
                Ok(self.fallback.check(&storage_key, rule, cost, ttl))
            }
        }
    }
}
