//! Rate-limit keys and their persisted naming scheme.
//!
//! The key is the unit of atomicity: every correctness guarantee holds
//! per key and never across keys.

use crate::rule::RateLimitRule;

/// Addresses one quota: a client identifier plus a scope (typically an
/// endpoint name), optionally narrowed to one shard of a hot key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    client: String,
    scope: String,
    shard: Option<u32>,
}

impl RateLimitKey {
    /// Key for `client`'s quota within `scope`.
    pub fn new(client: impl Into<String>, scope: impl Into<String>) -> Self {
        Self { client: client.into(), scope: scope.into(), shard: None }
    }

    /// The same key narrowed to one shard of a hot key.
    pub fn with_shard(mut self, shard: u32) -> Self {
        self.shard = Some(shard);
        self
    }

    /// The opaque client identifier.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// The scope (endpoint name or similar).
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Shard index, if this key addresses one shard of a hot key.
    pub fn shard(&self) -> Option<u32> {
        self.shard
    }

    /// Name under which state for this key lives in the backing store:
    /// `ratelimit:{algorithm}:{window}s:{client}:{scope}[:{shard}]`.
    ///
    /// The algorithm is part of the name so changing a rule's algorithm
    /// starts from fresh state instead of misreading the old encoding. The
    /// window is part of the name so composed levels (burst + per-minute +
    /// per-hour) running the same algorithm keep independent state.
    pub fn storage_key(&self, rule: &RateLimitRule) -> String {
        let mut name = format!(
            "ratelimit:{}:{}s:{}:{}",
            rule.algorithm().as_str(),
            rule.window_seconds(),
            self.client,
            self.scope
        );
        if let Some(shard) = self.shard {
            name.push(':');
            name.push_str(&shard.to_string());
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Algorithm;
    use std::time::Duration;

    fn rule(algorithm: Algorithm, window: Duration) -> RateLimitRule {
        RateLimitRule::builder().limit(10).window(window).algorithm(algorithm).build().unwrap()
    }

    #[test]
    fn storage_key_without_shard() {
        let key = RateLimitKey::new("user-9", "search");
        let rule = rule(Algorithm::TokenBucket, Duration::from_secs(60));
        assert_eq!(key.storage_key(&rule), "ratelimit:token_bucket:60s:user-9:search");
        assert_eq!(key.shard(), None);
    }

    #[test]
    fn storage_key_with_shard() {
        let key = RateLimitKey::new("user-9", "search").with_shard(3);
        let rule = rule(Algorithm::SlidingWindowCounter, Duration::from_secs(1));
        assert_eq!(key.storage_key(&rule), "ratelimit:window_counter:1s:user-9:search:3");
        assert_eq!(key.shard(), Some(3));
    }

    #[test]
    fn fractional_windows_keep_a_readable_name() {
        let key = RateLimitKey::new("user-9", "search");
        let rule = rule(Algorithm::TokenBucket, Duration::from_millis(500));
        assert_eq!(key.storage_key(&rule), "ratelimit:token_bucket:0.5s:user-9:search");
    }

    #[test]
    fn algorithm_and_window_change_the_namespace() {
        let key = RateLimitKey::new("user-9", "search");
        let minute = rule(Algorithm::TokenBucket, Duration::from_secs(60));
        let second = rule(Algorithm::TokenBucket, Duration::from_secs(1));
        let log = rule(Algorithm::SlidingWindowLog, Duration::from_secs(60));
        assert_ne!(key.storage_key(&minute), key.storage_key(&second));
        assert_ne!(key.storage_key(&minute), key.storage_key(&log));
    }
}
