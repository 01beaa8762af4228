#![forbid(unsafe_code)]

//! # Turnstile
//!
//! Distributed rate limiting and admission control for async Rust. Sits in
//! front of backend services and decides, per unit of work, whether to admit
//! or reject it, with quotas that stay correct even when many independent
//! gateway processes check the same quota concurrently.
//!
//! ## Features
//!
//! - **Three algorithms**: token bucket, sliding window log (exact), and
//!   sliding window counter (approximate, O(1) memory)
//! - **One atomic store call per decision** through a pluggable
//!   [`BackingStore`] contract (reference in-memory CAS implementation
//!   included)
//! - **Multi-level composition**: burst + per-minute + per-hour rules with
//!   per-rule request costs
//! - **Hot-key sharding** to relieve store contention on disproportionately
//!   busy keys
//! - **Graceful degradation**: fail-open, fail-closed, or process-local
//!   approximation when the store is unreachable
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use turnstile::{Algorithm, InMemoryStore, RateLimitKey, RateLimitRule, RateLimiterEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turnstile::ConfigError> {
//!     let rule = RateLimitRule::builder()
//!         .limit(100)
//!         .window(Duration::from_secs(60))
//!         .algorithm(Algorithm::TokenBucket)
//!         .build()?;
//!
//!     let engine = RateLimiterEngine::new(InMemoryStore::new());
//!     let key = RateLimitKey::new("client-42", "search");
//!
//!     let decision = engine.check(&key, &rule, 1).await?;
//!     assert!(decision.is_allowed());
//!     Ok(())
//! }
//! ```

mod algorithms;
pub mod clock;
pub mod composer;
pub mod decision;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod key;
pub mod rule;
pub mod shard;
pub mod state;
pub mod store;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use composer::{CheckRequest, Composer};
pub use decision::{Decision, DenyReason};
pub use engine::{EngineConfig, RateLimiterEngine};
pub use error::{ConfigError, StoreError};
pub use fallback::FallbackLimiter;
pub use key::RateLimitKey;
pub use rule::{
    Algorithm, ConfigResolver, FallbackPolicy, RateLimitRule, RateLimitRuleBuilder, StaticResolver,
};
pub use shard::ShardRouter;
pub use state::{BucketState, WindowEntry};
pub use store::{BackingStore, InMemoryStore, RetryBudget, StateTransform};
