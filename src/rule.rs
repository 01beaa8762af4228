//! Quota rules and the resolver interface that supplies them.
//!
//! A [`RateLimitRule`] is immutable once built. Rules are resolved fresh
//! per request through a [`ConfigResolver`] so that configuration changes
//! take effect without restarting callers; the limiter itself never caches
//! or mutates them.

use crate::error::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Which admission algorithm a rule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Refillable token balance; smooth, O(1) memory.
    TokenBucket,
    /// Exact log of admissions; memory proportional to request volume.
    SlidingWindowLog,
    /// Two blended fixed windows; approximate, O(1) memory.
    SlidingWindowCounter,
}

impl Algorithm {
    /// Stable name used in persisted storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::SlidingWindowLog => "window_log",
            Algorithm::SlidingWindowCounter => "window_counter",
        }
    }
}

/// What a rule does while the backing store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Admit everything; protects availability, sacrifices enforcement.
    FailOpen,
    /// Reject everything; protects the backend, sacrifices availability.
    FailClosed,
    /// Best-effort token bucket in process-local memory. Not shared across
    /// instances, so enforcement is approximate under horizontal scale-out.
    #[default]
    LocalApproximate,
}

/// Immutable description of one quota.
///
/// Built via [`RateLimitRule::builder`], which validates at construction
/// time so a malformed rule can never reach the hot path.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRule {
    limit: u32,
    window: Duration,
    cost_per_request: u32,
    algorithm: Algorithm,
    shards: u32,
    fallback: FallbackPolicy,
}

impl RateLimitRule {
    /// Start building a rule. `limit` and `window` are required.
    pub fn builder() -> RateLimitRuleBuilder {
        RateLimitRuleBuilder::default()
    }

    /// Maximum admitted cost per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in fractional seconds.
    pub fn window_seconds(&self) -> f64 {
        self.window.as_secs_f64()
    }

    /// Cost charged per unit of work under this rule.
    pub fn cost_per_request(&self) -> u32 {
        self.cost_per_request
    }

    /// The admission algorithm this rule runs.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// How many sub-keys a hot key is split across (1 = unsharded).
    pub fn shards(&self) -> u32 {
        self.shards
    }

    /// Degraded-mode policy while the backing store is unreachable.
    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Token-bucket refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.limit) / self.window_seconds()
    }

    /// Per-shard slice of this rule: `limit / shards` (at least 1), no
    /// further sharding. Used by the shard router.
    pub(crate) fn shard_slice(&self) -> RateLimitRule {
        let mut slice = self.clone();
        slice.limit = (self.limit / self.shards).max(1);
        slice.shards = 1;
        slice
    }
}

/// Builder for [`RateLimitRule`].
#[derive(Debug, Clone, Default)]
pub struct RateLimitRuleBuilder {
    limit: u32,
    window: Duration,
    cost_per_request: Option<u32>,
    algorithm: Option<Algorithm>,
    shards: Option<u32>,
    fallback: Option<FallbackPolicy>,
}

impl RateLimitRuleBuilder {
    /// Maximum admitted cost per window. Required, must be > 0.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Window length. Required, must be > 0.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Cost charged per unit of work (default 1, must be ≥ 1).
    pub fn cost_per_request(mut self, cost: u32) -> Self {
        self.cost_per_request = Some(cost);
        self
    }

    /// Admission algorithm (default [`Algorithm::TokenBucket`]).
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Split this rule's key across `shards` sub-keys to relieve store
    /// contention on hot keys (default 1 = unsharded). Invalid for
    /// [`Algorithm::SlidingWindowLog`].
    pub fn shards(mut self, shards: u32) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Degraded-mode policy (default [`FallbackPolicy::LocalApproximate`]).
    pub fn fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Validate and build the rule.
    pub fn build(self) -> Result<RateLimitRule, ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::NonPositiveLimit);
        }
        if self.window.is_zero() {
            return Err(ConfigError::NonPositiveWindow { seconds: self.window.as_secs_f64() });
        }
        let cost_per_request = self.cost_per_request.unwrap_or(1);
        if cost_per_request == 0 {
            return Err(ConfigError::ZeroCost);
        }
        let algorithm = self.algorithm.unwrap_or(Algorithm::TokenBucket);
        let shards = self.shards.unwrap_or(1).max(1);
        if shards > 1 && algorithm == Algorithm::SlidingWindowLog {
            return Err(ConfigError::ShardedWindowLog { shards });
        }
        Ok(RateLimitRule {
            limit: self.limit,
            window: self.window,
            cost_per_request,
            algorithm,
            shards,
            fallback: self.fallback.unwrap_or_default(),
        })
    }
}

/// External collaborator that maps a client tier and scope to the rules in
/// force for it. The limiter re-resolves per request; caching and change
/// cadence are the resolver's concern.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Rules to enforce for `client_tier` within `scope`, tightest window
    /// first or in any order (the composer sorts).
    async fn resolve(
        &self,
        client_tier: &str,
        scope: &str,
    ) -> Result<Vec<RateLimitRule>, ConfigError>;
}

/// In-memory resolver for tests and fixed deployments.
#[derive(Debug, Default)]
pub struct StaticResolver {
    rules: HashMap<(String, String), Vec<RateLimitRule>>,
    default: Vec<RateLimitRule>,
}

impl StaticResolver {
    /// Empty resolver: every lookup yields no rules (everything admitted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules returned when no (tier, scope) entry matches.
    pub fn with_default(mut self, rules: Vec<RateLimitRule>) -> Self {
        self.default = rules;
        self
    }

    /// Register rules for one (tier, scope) pair.
    pub fn insert(
        mut self,
        tier: impl Into<String>,
        scope: impl Into<String>,
        rules: Vec<RateLimitRule>,
    ) -> Self {
        self.rules.insert((tier.into(), scope.into()), rules);
        self
    }
}

#[async_trait]
impl ConfigResolver for StaticResolver {
    async fn resolve(
        &self,
        client_tier: &str,
        scope: &str,
    ) -> Result<Vec<RateLimitRule>, ConfigError> {
        let exact = self.rules.get(&(client_tier.to_string(), scope.to_string()));
        Ok(exact.unwrap_or(&self.default).clone())
    }
}
