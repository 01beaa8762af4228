//! The shared-store contract and its in-memory reference implementation.
//!
//! The engine never reads or writes bucket state directly: it hands the
//! store a pure transform and the store guarantees that read, compute, and
//! write are observed as one indivisible unit per key. Two implementation
//! strategies satisfy the contract: ship the transform into the store
//! (server-side scripting/transactions), or run an optimistic
//! compare-and-swap loop against a versioned read. [`InMemoryStore`] is the
//! reference CAS-loop implementation; distributed backends plug in behind
//! the same trait.

use crate::clock::{Clock, SystemClock};
use crate::decision::Decision;
use crate::error::StoreError;
use crate::state::BucketState;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pure state transition shipped into the store by the engine.
pub type StateTransform<'a> = &'a (dyn Fn(Option<BucketState>) -> (BucketState, Decision) + Send + Sync);

/// Shared key-value store with per-key atomic read-modify-write.
///
/// Implementations must guarantee that two concurrent `execute_atomic`
/// calls on the same key never both observe the same prior state and both
/// commit; different keys never block each other. Every successful write
/// (re)arms the key's TTL so abandoned keys expire without explicit
/// deletion.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Atomically apply `transform` to the state under `key`, persist the
    /// result with `ttl`, and return the transform's decision.
    async fn execute_atomic(
        &self,
        key: &str,
        ttl: Duration,
        transform: StateTransform<'_>,
    ) -> Result<Decision, StoreError>;
}

/// Bounded optimistic-write budget: attempts plus full-jitter exponential
/// backoff between conflicts. Never an unbounded spin.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    /// Maximum read-compute-write rounds before giving up.
    pub max_attempts: usize,
    /// Backoff ceiling after the first conflict.
    pub base_delay: Duration,
    /// Absolute backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_micros(500),
            max_delay: Duration::from_millis(5),
        }
    }
}

impl RetryBudget {
    /// Full-jitter delay before retrying after conflicted `attempt`
    /// (1-based): uniform in `[0, min(max_delay, base * 2^(attempt-1))]`.
    pub(crate) fn delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        let ceiling = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        let upper = u64::try_from(ceiling.as_micros()).unwrap_or(u64::MAX);
        if upper == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..=upper))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    state: BucketState,
    version: u64,
    expires_at: f64,
}

/// Reference [`BackingStore`]: a versioned in-process map driven by the
/// optimistic CAS loop from the contract.
///
/// The transform runs outside the map lock, so concurrent callers on one
/// key genuinely race and lose CAS rounds, exactly as they would against a
/// remote store. Useful for tests and single-node deployments.
#[derive(Debug)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    retry: RetryBudget,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Store on the system clock with the default retry budget.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store whose TTL expiry follows `clock`. The store's clock is
    /// authoritative for expiry regardless of what the engine was given.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { data: Mutex::new(HashMap::new()), clock, retry: RetryBudget::default() }
    }

    /// Replace the CAS retry budget.
    pub fn with_retry_budget(mut self, retry: RetryBudget) -> Self {
        self.retry = retry;
        self
    }

    /// Versioned read; an expired entry reads as absent.
    fn snapshot(&self, key: &str) -> Option<(BucketState, u64)> {
        let now = self.clock.now();
        let guard = self.data.lock().unwrap();
        guard
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| (entry.state.clone(), entry.version))
    }

    /// Conditional write: succeeds only if the key's version still matches
    /// `expected` (`None` = key absent or expired at read time).
    fn commit(
        &self,
        key: &str,
        state: BucketState,
        expected: Option<u64>,
        ttl: Duration,
    ) -> bool {
        let now = self.clock.now();
        let mut guard = self.data.lock().unwrap();
        // Writes double as the sweep point, so idle keys are reclaimed even
        // when nobody asks for a count.
        guard.retain(|_, entry| entry.expires_at > now);
        let live_version = guard.get(key).map(|entry| entry.version);
        if live_version != expected {
            return false;
        }
        let version = live_version.map_or(1, |v| v + 1);
        guard.insert(
            key.to_string(),
            Entry { state, version, expires_at: now + ttl.as_secs_f64() },
        );
        true
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.snapshot(key).is_some()
    }

    /// Number of live entries; sweeps expired ones as a side effect.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.data.lock().unwrap();
        guard.retain(|_, entry| entry.expires_at > now);
        guard.len()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    async fn execute_atomic(
        &self,
        key: &str,
        ttl: Duration,
        transform: StateTransform<'_>,
    ) -> Result<Decision, StoreError> {
        for attempt in 1..=self.retry.max_attempts {
            let snapshot = self.snapshot(key);
            let (prev, expected) = match snapshot {
                Some((state, version)) => (Some(state), Some(version)),
                None => (None, None),
            };
            let (next, decision) = transform(prev);
            if self.commit(key, next, expected, ttl) {
                return Ok(decision);
            }
            tracing::trace!(key, attempt, "cas conflict, retrying");
            tokio::time::sleep(self.retry.delay(attempt)).await;
        }
        Err(StoreError::ContentionExceeded { attempts: self.retry.max_attempts })
    }
}
