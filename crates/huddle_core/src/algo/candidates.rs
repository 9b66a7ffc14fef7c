//! Candidate meeting times sliced out of availability windows.
//!
//! # Invariants
//! - Windows are walked in the given order; within a window, candidates start
//!   at `window.start + k * step` and end no later than `window.end`.
//! - The maximum is checked after every emission and after every window.

use crate::model::Interval;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-duration meeting offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Reserved for ranking; always 0 for now.
    pub score: i32,
}

/// Enumerates every `[cur, cur + duration)` that fits inside a window.
///
/// Returns nothing when `duration` or `step` is not positive. Empty or
/// inverted windows contribute no candidates.
pub fn generate_candidates(
    windows: &[Interval],
    duration: Duration,
    step: Duration,
    max: Option<usize>,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    if duration <= Duration::zero() || step <= Duration::zero() {
        return out;
    }
    let reached = |out: &Vec<Candidate>| max.is_some_and(|limit| out.len() >= limit);
    if reached(&out) {
        return out;
    }

    for window in windows {
        let mut cur = window.start;
        while cur + duration <= window.end {
            out.push(Candidate {
                start: cur,
                end: cur + duration,
                score: 0,
            });
            if reached(&out) {
                break;
            }
            cur += step;
        }
        if reached(&out) {
            break;
        }
    }
    out
}

/// Places a meeting of `duration` at the start of `window`, if it fits.
pub fn fit_at_window_start(window: &Interval, duration: Duration) -> Option<Interval> {
    let end = window.start + duration;
    if duration <= Duration::zero() || end > window.end {
        return None;
    }
    Some(Interval {
        start: window.start,
        end,
    })
}
