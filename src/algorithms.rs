//! The three admission algorithms as pure state transitions.
//!
//! Each function takes the previous persisted state (or `None` on first
//! sight of a key) and returns the next state plus a [`Decision`]. Keeping
//! them pure is what lets the engine ship one closure through the store's
//! atomic execute: read, compute, write is a single indivisible unit and the
//! math itself is trivially unit-testable with synthetic clocks.

use crate::decision::{Decision, DenyReason};
use crate::rule::{Algorithm, RateLimitRule};
use crate::state::{BucketState, WindowEntry};
use std::time::Duration;

/// Run `rule`'s algorithm over `state` at time `now` (seconds since epoch),
/// charging `cost` on admission.
pub(crate) fn apply(
    rule: &RateLimitRule,
    cost: u32,
    now: f64,
    state: Option<BucketState>,
) -> (BucketState, Decision) {
    match rule.algorithm() {
        Algorithm::TokenBucket => token_bucket(rule, cost, now, state),
        Algorithm::SlidingWindowLog => window_log(rule, cost, now, state),
        Algorithm::SlidingWindowCounter => window_counter(rule, cost, now, state),
    }
}

fn token_bucket(
    rule: &RateLimitRule,
    cost: u32,
    now: f64,
    state: Option<BucketState>,
) -> (BucketState, Decision) {
    let capacity = f64::from(rule.limit());
    let rate = rule.refill_rate();

    let (tokens, last_refill_at) = match state {
        Some(BucketState::TokenBucket { tokens, last_refill_at }) => (tokens, last_refill_at),
        // First sight of the key, or the algorithm changed under it.
        _ => (capacity, now),
    };

    // Clamp to tolerate minor skew between the caller's clock and the
    // store's; a backwards step must not drain the bucket.
    let elapsed = (now - last_refill_at).max(0.0);
    let tokens = (tokens + elapsed * rate).min(capacity);
    let cost_f = f64::from(cost);

    if tokens >= cost_f {
        let tokens = tokens - cost_f;
        let next = BucketState::TokenBucket { tokens, last_refill_at: now };
        (next, Decision::Allowed { remaining: tokens.floor() as u32 })
    } else {
        // Persist the refill even on denial so the balance stays current.
        let next = BucketState::TokenBucket { tokens, last_refill_at: now };
        let wait = (cost_f - tokens) / rate;
        (
            next,
            Decision::Denied {
                retry_after: Duration::from_secs_f64(wait),
                reason: DenyReason::RateExceeded,
            },
        )
    }
}

fn window_log(
    rule: &RateLimitRule,
    cost: u32,
    now: f64,
    state: Option<BucketState>,
) -> (BucketState, Decision) {
    let window = rule.window_seconds();
    let limit = u64::from(rule.limit());

    let mut entries = match state {
        Some(BucketState::WindowLog { entries }) => entries,
        _ => Vec::new(),
    };
    let cutoff = now - window;
    entries.retain(|entry| entry.at >= cutoff);

    let in_window: u64 = entries.iter().map(|entry| u64::from(entry.weight)).sum();

    if in_window + u64::from(cost) <= limit {
        entries.push(WindowEntry { at: now, weight: cost });
        let remaining = (limit - in_window - u64::from(cost)) as u32;
        (BucketState::WindowLog { entries }, Decision::Allowed { remaining })
    } else {
        // Quota frees up when the oldest surviving admission slides out.
        let oldest = entries.iter().map(|entry| entry.at).fold(f64::INFINITY, f64::min);
        let wait = if oldest.is_finite() { (oldest + window - now).max(0.0) } else { window };
        (
            BucketState::WindowLog { entries },
            Decision::Denied {
                retry_after: Duration::from_secs_f64(wait),
                reason: DenyReason::RateExceeded,
            },
        )
    }
}

fn window_counter(
    rule: &RateLimitRule,
    cost: u32,
    now: f64,
    state: Option<BucketState>,
) -> (BucketState, Decision) {
    let window = rule.window_seconds();
    let limit = f64::from(rule.limit());
    let aligned_start = (now / window).floor() * window;

    let (mut prev_count, mut curr_count, mut window_start) = match state {
        Some(BucketState::WindowCounter { prev_count, curr_count, window_start }) => {
            (prev_count, curr_count, window_start)
        }
        _ => (0, 0, aligned_start),
    };

    // Roll over at most once: after a full idle window the old current
    // count is no longer adjacent and must not bleed into the blend.
    if now - window_start >= window {
        prev_count = if now - window_start >= 2.0 * window { 0 } else { curr_count };
        curr_count = 0;
        window_start = aligned_start;
    }

    // Clamp for skew like the bucket's elapsed: a peer's clock can run
    // ahead and write a window_start this caller has not reached yet.
    let overlap = (1.0 - (now - window_start) / window).clamp(0.0, 1.0);
    let effective = f64::from(prev_count) * overlap + f64::from(curr_count);
    let cost_f = f64::from(cost);

    if effective + cost_f <= limit {
        curr_count += cost;
        let remaining = (limit - effective - cost_f).max(0.0).floor() as u32;
        (
            BucketState::WindowCounter { prev_count, curr_count, window_start },
            Decision::Allowed { remaining },
        )
    } else {
        // The previous window's contribution decays linearly at
        // prev / window per second; wait until enough has decayed, or
        // until the boundary if the current window alone is over.
        let excess = effective + cost_f - limit;
        let boundary = (window_start + window - now).max(0.0);
        let wait = if prev_count > 0 {
            (excess * window / f64::from(prev_count)).min(boundary)
        } else {
            boundary
        };
        (
            BucketState::WindowCounter { prev_count, curr_count, window_start },
            Decision::Denied {
                retry_after: Duration::from_secs_f64(wait),
                reason: DenyReason::RateExceeded,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(limit: u32, window_secs: u64, algorithm: Algorithm) -> RateLimitRule {
        RateLimitRule::builder()
            .limit(limit)
            .window(Duration::from_secs(window_secs))
            .algorithm(algorithm)
            .build()
            .unwrap()
    }

    mod token_bucket {
        use super::*;

        #[test]
        fn fresh_key_starts_with_a_full_bucket() {
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let (state, decision) = apply(&rule, 1, 100.0, None);
            assert_eq!(decision, Decision::Allowed { remaining: 9 });
            assert_eq!(state, BucketState::TokenBucket { tokens: 9.0, last_refill_at: 100.0 });
        }

        #[test]
        fn exactly_limit_requests_pass_with_no_elapsed_time() {
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let mut state = None;
            let mut allowed = 0;
            for _ in 0..25 {
                let (next, decision) = apply(&rule, 1, 100.0, state);
                if decision.is_allowed() {
                    allowed += 1;
                }
                state = Some(next);
            }
            assert_eq!(allowed, 10);
        }

        #[test]
        fn refill_is_clamped_to_capacity() {
            // capacity 10, refill 2/s, idle 1000s: still 10, not 2000
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let state = BucketState::TokenBucket { tokens: 0.0, last_refill_at: 0.0 };
            let (next, decision) = apply(&rule, 1, 1000.0, Some(state));
            assert_eq!(decision, Decision::Allowed { remaining: 9 });
            assert_eq!(next, BucketState::TokenBucket { tokens: 9.0, last_refill_at: 1000.0 });
        }

        #[test]
        fn backwards_clock_step_does_not_drain() {
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let state = BucketState::TokenBucket { tokens: 4.0, last_refill_at: 100.0 };
            let (next, decision) = apply(&rule, 1, 99.0, Some(state));
            assert!(decision.is_allowed());
            assert_eq!(next, BucketState::TokenBucket { tokens: 3.0, last_refill_at: 99.0 });
        }

        #[test]
        fn denial_reports_time_until_enough_tokens() {
            // refill 2/s, 0 tokens, cost 1: wait 0.5s
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let state = BucketState::TokenBucket { tokens: 0.0, last_refill_at: 100.0 };
            let (next, decision) = apply(&rule, 1, 100.0, Some(state));
            assert_eq!(decision.retry_after(), Some(Duration::from_secs_f64(0.5)));
            assert_eq!(decision.reason(), Some(DenyReason::RateExceeded));
            // refill applied and persisted even on denial
            assert_eq!(next, BucketState::TokenBucket { tokens: 0.0, last_refill_at: 100.0 });
        }

        #[test]
        fn partial_refill_admits_partially() {
            // burst drained the bucket at t=100; at t=101 exactly 2 tokens back
            let rule = rule(10, 5, Algorithm::TokenBucket);
            let mut state = Some(BucketState::TokenBucket { tokens: 0.0, last_refill_at: 100.0 });
            let mut allowed = 0;
            for _ in 0..5 {
                let (next, decision) = apply(&rule, 1, 101.0, state);
                if decision.is_allowed() {
                    allowed += 1;
                }
                state = Some(next);
            }
            assert_eq!(allowed, 2);
        }
    }

    mod window_log {
        use super::*;

        #[test]
        fn counts_weighted_entries_in_window() {
            let rule = rule(10, 60, Algorithm::SlidingWindowLog);
            let (state, decision) = apply(&rule, 4, 100.0, None);
            assert_eq!(decision, Decision::Allowed { remaining: 6 });
            let (state, decision) = apply(&rule, 6, 110.0, Some(state));
            assert_eq!(decision, Decision::Allowed { remaining: 0 });
            let (_, decision) = apply(&rule, 1, 120.0, Some(state));
            assert!(!decision.is_allowed());
        }

        #[test]
        fn old_entries_are_purged_before_counting() {
            let rule = rule(2, 60, Algorithm::SlidingWindowLog);
            let state = BucketState::WindowLog {
                entries: vec![
                    WindowEntry { at: 10.0, weight: 1 },
                    WindowEntry { at: 30.0, weight: 1 },
                ],
            };
            // At t=75 the t=10 entry has slid out (75 - 60 = 15 > 10).
            let (next, decision) = apply(&rule, 1, 75.0, Some(state));
            assert!(decision.is_allowed());
            match next {
                BucketState::WindowLog { entries } => {
                    assert_eq!(entries.len(), 2);
                    assert_eq!(entries[0].at, 30.0);
                }
                other => panic!("unexpected state {other:?}"),
            }
        }

        #[test]
        fn retry_after_tracks_the_oldest_survivor() {
            let rule = rule(2, 60, Algorithm::SlidingWindowLog);
            let state = BucketState::WindowLog {
                entries: vec![
                    WindowEntry { at: 50.0, weight: 1 },
                    WindowEntry { at: 80.0, weight: 1 },
                ],
            };
            let (_, decision) = apply(&rule, 1, 100.0, Some(state));
            // oldest (t=50) + window (60) - now (100) = 10s
            assert_eq!(decision.retry_after(), Some(Duration::from_secs_f64(10.0)));
        }
    }

    mod window_counter {
        use super::*;

        // The worked example: prev=80, curr=30, limit=100, 75% through the
        // current window, so overlap = 0.25 and effective = 80*0.25 + 30 = 50.
        fn three_quarters_state(curr_count: u32) -> BucketState {
            BucketState::WindowCounter { prev_count: 80, curr_count, window_start: 60.0 }
        }

        #[test]
        fn blended_count_admits_below_limit() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            let (next, decision) = apply(&rule, 1, 105.0, Some(three_quarters_state(30)));
            assert!(decision.is_allowed());
            assert_eq!(
                next,
                BucketState::WindowCounter { prev_count: 80, curr_count: 31, window_start: 60.0 }
            );
        }

        #[test]
        fn boundary_arithmetic_matches_worked_example() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            // effective = 95: cost 1 -> 96, allowed
            let (_, decision) = apply(&rule, 1, 105.0, Some(three_quarters_state(75)));
            assert!(decision.is_allowed());
            // cost 6 -> 101, denied
            let (next, decision) = apply(&rule, 6, 105.0, Some(three_quarters_state(75)));
            assert!(!decision.is_allowed());
            // denial does not consume
            assert_eq!(next, three_quarters_state(75));
        }

        #[test]
        fn rollover_happens_exactly_once() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            let state =
                BucketState::WindowCounter { prev_count: 10, curr_count: 40, window_start: 60.0 };
            // t=125 is inside the next fixed window: curr becomes prev
            let (next, _) = apply(&rule, 1, 125.0, Some(state));
            assert_eq!(
                next,
                BucketState::WindowCounter { prev_count: 40, curr_count: 1, window_start: 120.0 }
            );
        }

        #[test]
        fn idle_gap_clears_the_previous_window() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            let state =
                BucketState::WindowCounter { prev_count: 10, curr_count: 90, window_start: 60.0 };
            // Two windows later the old current count is stale, not "previous".
            let (next, decision) = apply(&rule, 1, 250.0, Some(state));
            assert!(decision.is_allowed());
            assert_eq!(
                next,
                BucketState::WindowCounter { prev_count: 0, curr_count: 1, window_start: 240.0 }
            );
        }

        #[test]
        fn fresh_key_aligns_to_the_window_grid() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            let (next, decision) = apply(&rule, 1, 130.0, None);
            assert!(decision.is_allowed());
            assert_eq!(
                next,
                BucketState::WindowCounter { prev_count: 0, curr_count: 1, window_start: 120.0 }
            );
        }

        #[test]
        fn reading_behind_a_peer_written_window_start_does_not_inflate_the_blend() {
            let rule = rule(101, 60, Algorithm::SlidingWindowCounter);
            // A faster peer already rolled the window to start at t=60; this
            // caller's clock still reads 59.5. The previous window weighs in
            // at full strength, never more.
            let state =
                BucketState::WindowCounter { prev_count: 100, curr_count: 0, window_start: 60.0 };
            let (next, decision) = apply(&rule, 1, 59.5, Some(state));
            assert_eq!(decision, Decision::Allowed { remaining: 0 });
            assert_eq!(
                next,
                BucketState::WindowCounter { prev_count: 100, curr_count: 1, window_start: 60.0 }
            );
        }

        #[test]
        fn denial_waits_for_the_previous_window_to_decay() {
            let rule = rule(100, 60, Algorithm::SlidingWindowCounter);
            // effective = 95, cost 6 -> excess 1; decay rate 80/60 per second
            let (_, decision) = apply(&rule, 6, 105.0, Some(three_quarters_state(75)));
            let wait = decision.retry_after().unwrap();
            assert!(wait > Duration::ZERO);
            // never told to wait past the window boundary (15s away)
            assert!(wait <= Duration::from_secs(15));
        }
    }
}
