//! The decision returned by every rate-limit check.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a request was turned away.
///
/// Lets operators distinguish "legitimately too expensive" from
/// "rate exceeded" from "degraded mode said no".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// The quota for the window is spent.
    RateExceeded,
    /// The request's cost alone exceeds the rule's entire limit; it can
    /// never be admitted under this rule.
    CostExceedsLimit,
    /// The backing store is unreachable and the rule is fail-closed.
    Degraded,
}

/// Outcome of a rate-limit check.
///
/// This is the only thing callers ever see; internal bucket state stays
/// behind the store boundary. The fields map directly onto conventional
/// response metadata (`X-RateLimit-Remaining`, `Retry-After`) but the
/// header/status mapping belongs to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// The request is admitted.
    Allowed {
        /// Quota left after this admission.
        remaining: u32,
    },
    /// The request is rejected.
    Denied {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
        /// Why the request was rejected.
        reason: DenyReason,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Remaining quota, if admitted.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Decision::Allowed { remaining } => Some(*remaining),
            Decision::Denied { .. } => None,
        }
    }

    /// Suggested wait before retrying, if rejected.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { retry_after, .. } => Some(*retry_after),
        }
    }

    /// Rejection reason, if rejected.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason, .. } => Some(*reason),
        }
    }
}
