//! Hot-key mitigation: split one contended key across N sub-keys.
//!
//! Each shard runs the rule independently with `limit / shards` as its
//! local limit; there is no cross-shard read, so a client's admitted total
//! may transiently deviate from the global limit by up to one shard's
//! worth. That imprecision is the price of removing the single-key
//! bottleneck. Shard counts are static per rule.

use crate::decision::Decision;
use crate::error::ConfigError;
use crate::key::RateLimitKey;
use crate::rule::RateLimitRule;
use crate::store::BackingStore;
use crate::RateLimiterEngine;
use rand::Rng;
use std::hash::{Hash, Hasher};

/// Routes checks for sharded rules to one sub-key, passing unsharded rules
/// straight through to the engine.
pub struct ShardRouter<S> {
    engine: RateLimiterEngine<S>,
}

impl<S: BackingStore> ShardRouter<S> {
    /// Router in front of `engine`.
    pub fn new(engine: RateLimiterEngine<S>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &RateLimiterEngine<S> {
        &self.engine
    }

    /// Check `cost` against `rule`, spreading sharded rules by
    /// `request_id`. Without a request id the shard is picked uniformly at
    /// random, which spreads load equally well but loses per-request
    /// determinism.
    pub async fn check(
        &self,
        key: &RateLimitKey,
        rule: &RateLimitRule,
        cost: u32,
        request_id: Option<&str>,
    ) -> Result<Decision, ConfigError> {
        let shards = rule.shards();
        if shards <= 1 {
            return self.engine.check(key, rule, cost).await;
        }

        let index = match request_id {
            Some(id) => Self::shard_index(id, shards),
            None => rand::rng().random_range(0..shards),
        };
        let shard_key = key.clone().with_shard(index);
        let shard_rule = rule.shard_slice();
        self.engine.check(&shard_key, &shard_rule, cost).await
    }

    fn shard_index(request_id: &str, shards: u32) -> u32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        request_id.hash(&mut hasher);
        (hasher.finish() % u64::from(shards)) as u32
    }
}
