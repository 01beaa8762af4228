//! Multi-level limiting: compose several rules into one decision.
//!
//! Rules are resolved fresh per call, evaluated tightest window first so
//! the cheapest denial short-circuits the rest, and never rolled back:
//! quota consumed by an earlier rule stands even when a later rule denies.
//! Strict all-or-nothing semantics across levels would need a read-only
//! pre-pass plus a commit pass (twice the store round trips); this engine
//! deliberately takes the single-pass mode.

use crate::decision::Decision;
use crate::error::ConfigError;
use crate::key::RateLimitKey;
use crate::rule::ConfigResolver;
use crate::shard::ShardRouter;
use crate::store::BackingStore;
use crate::RateLimiterEngine;
use std::sync::Arc;

/// One unit of work to admit or reject.
#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    /// Opaque client identifier; part of the rate-limit key.
    pub client: &'a str,
    /// Tier the resolver uses to pick rules (plan, role, ...).
    pub tier: &'a str,
    /// Scope being accessed, typically an endpoint name.
    pub scope: &'a str,
    /// Units of work; each rule charges `units × cost_per_request`.
    pub units: u32,
    /// Request id for deterministic shard spreading, if the caller has one.
    pub request_id: Option<&'a str>,
}

impl<'a> CheckRequest<'a> {
    /// One unit of work for `client` in `scope`, default tier.
    pub fn new(client: &'a str, scope: &'a str) -> Self {
        Self { client, tier: "default", scope, units: 1, request_id: None }
    }

    /// Resolve rules for `tier` instead of the default tier.
    pub fn tier(mut self, tier: &'a str) -> Self {
        self.tier = tier;
        self
    }

    /// Charge `units` units of work instead of 1.
    pub fn units(mut self, units: u32) -> Self {
        self.units = units;
        self
    }

    /// Spread sharded rules deterministically by this request id.
    pub fn request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

/// Evaluates every rule in force for a request and admits only when all
/// levels agree.
pub struct Composer<S, R> {
    router: ShardRouter<S>,
    resolver: Arc<R>,
}

impl<S: BackingStore, R: ConfigResolver> Composer<S, R> {
    /// Composer running `engine` behind `resolver`.
    pub fn new(engine: RateLimiterEngine<S>, resolver: R) -> Self {
        Self { router: ShardRouter::new(engine), resolver: Arc::new(resolver) }
    }

    /// The shard router (and through it, the engine).
    pub fn router(&self) -> &ShardRouter<S> {
        &self.router
    }

    /// Admit or reject one request against every rule resolved for its
    /// tier and scope.
    ///
    /// With no rules in force the request is admitted with unconstrained
    /// remaining quota. When all rules admit, the reported `remaining` is
    /// the tightest (smallest) across levels.
    pub async fn check(&self, request: &CheckRequest<'_>) -> Result<Decision, ConfigError> {
        if request.units == 0 {
            return Err(ConfigError::ZeroCost);
        }
        let mut rules = self.resolver.resolve(request.tier, request.scope).await?;
        // Tightest window first: the burst limit is the most likely to
        // deny, so it goes before the per-minute and per-hour levels.
        rules.sort_by_key(|rule| rule.window());

        let key = RateLimitKey::new(request.client, request.scope);
        let mut remaining = u32::MAX;

        for rule in &rules {
            let cost = request.units.saturating_mul(rule.cost_per_request());
            let decision = self.router.check(&key, rule, cost, request.request_id).await?;
            match decision {
                Decision::Allowed { remaining: level_remaining } => {
                    remaining = remaining.min(level_remaining);
                }
                Decision::Denied { .. } => return Ok(decision),
            }
        }
        Ok(Decision::Allowed { remaining })
    }
}
