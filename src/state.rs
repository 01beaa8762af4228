//! Persisted per-key state, one variant per algorithm.
//!
//! Values are serde-encodable so distributed [`BackingStore`]
//! implementations have a wire format; the in-memory reference store keeps
//! them as-is. State is created lazily on first sight of a key (full
//! bucket / empty window), mutated only through atomic store transforms,
//! and reclaimed by the store's own TTL expiry.
//!
//! [`BackingStore`]: crate::store::BackingStore

use serde::{Deserialize, Serialize};

/// One weighted admission in a sliding-window log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Admission time, seconds since the unix epoch.
    pub at: f64,
    /// Cost charged for the admission.
    pub weight: u32,
}

/// Algorithm-specific value stored under one rate-limit key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BucketState {
    /// Token bucket: current balance and the time it was last refilled.
    TokenBucket {
        /// Tokens currently available; never negative, never above capacity.
        tokens: f64,
        /// When `tokens` was last brought up to date.
        last_refill_at: f64,
    },
    /// Sliding window log: every admission inside the trailing window.
    WindowLog {
        /// Admissions, oldest first. Entries older than the window are
        /// purged before each count.
        entries: Vec<WindowEntry>,
    },
    /// Sliding window counter: two fixed windows blended into an
    /// approximation of a true sliding window.
    WindowCounter {
        /// Total admitted cost in the previous fixed window.
        prev_count: u32,
        /// Total admitted cost in the current fixed window.
        curr_count: u32,
        /// Start of the current fixed window, aligned to a multiple of the
        /// window length.
        window_start: f64,
    },
}
