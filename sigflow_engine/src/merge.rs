//! N-to-1 redundant input fusion with voting.
//!
//! Inputs contribute when their status is usable (Ok or Degraded) and,
//! with a non-zero freshness window, their age is inside it. The voted
//! candidate is always emitted when at least one input contributes,
//! even on a tolerance violation, so downstream stages can decide how
//! to handle degraded fusion.
//!
//! Status reduction:
//! - Ok: every configured input contributed with Ok status and the
//!   tolerance check passed.
//! - Degraded: a contributor is Degraded, or an input was dropped
//!   (stale/errored) while a quorum remains.
//! - the configured violation status (default Inconsistent): the
//!   contributing spread exceeds the tolerance.
//! - Error: no input contributes; the output value is left unchanged.

use heapless::Vec;

use sigflow_common::config::{MergeSpec, QuorumPolicy, VoteMethod};
use sigflow_common::consts::MAX_MERGE_INPUTS;
use sigflow_common::signal::SignalStatus;

use crate::store::SignalStore;

/// Result of one merge evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Voted candidate; `None` when no input contributed (the output
    /// keeps its previous value).
    pub value: Option<i32>,
    /// Reduced output status.
    pub status: SignalStatus,
}

/// Evaluate one merge against the store.
pub fn run_merge(spec: &MergeSpec, store: &SignalStore, now_us: u64) -> MergeOutcome {
    let mut values: Vec<i32, MAX_MERGE_INPUTS> = Vec::new();
    let mut all_contributing_ok = true;

    for &id in &spec.inputs {
        let slot = store.slot(id);
        let fresh = spec.stale_us == 0 || slot.age_us(now_us) <= spec.stale_us;
        if slot.status.is_usable() && fresh {
            if slot.status != SignalStatus::Ok {
                all_contributing_ok = false;
            }
            // Capacity equals the validated input list bound.
            let _ = values.push(slot.value);
        }
    }

    if values.is_empty() {
        return MergeOutcome {
            value: None,
            status: SignalStatus::Error,
        };
    }

    let candidate = vote(spec.method, &values, spec.tolerance);

    // Base reduction from contribution completeness.
    let dropped = values.len() < spec.inputs.len();
    let mut status = if dropped || !all_contributing_ok {
        SignalStatus::Degraded
    } else {
        SignalStatus::Ok
    };

    // Single survivor out of several: apply the configured quorum policy.
    if values.len() == 1 && spec.inputs.len() > 1 && spec.quorum_policy == QuorumPolicy::FallBack {
        status = surviving_status(spec, store, now_us);
    }

    // Tolerance spread check over the full contributing set.
    let (lo, hi) = min_max(&values);
    if i64::from(hi) - i64::from(lo) > i64::from(spec.tolerance) {
        status = status.worst(spec.violation_status);
    }

    MergeOutcome {
        value: Some(candidate),
        status,
    }
}

/// Status of the single contributing input (fall-back quorum policy).
fn surviving_status(spec: &MergeSpec, store: &SignalStore, now_us: u64) -> SignalStatus {
    for &id in &spec.inputs {
        let slot = store.slot(id);
        let fresh = spec.stale_us == 0 || slot.age_us(now_us) <= spec.stale_us;
        if slot.status.is_usable() && fresh {
            return slot.status;
        }
    }
    SignalStatus::Error
}

// ─── Voting ─────────────────────────────────────────────────────────

fn vote(method: VoteMethod, values: &[i32], tolerance: i32) -> i32 {
    match method {
        VoteMethod::Median => median(values),
        VoteMethod::Average => mean(values),
        VoteMethod::Min => min_max(values).0,
        VoteMethod::Max => min_max(values).1,
        VoteMethod::Majority => majority(values, tolerance),
    }
}

/// Min and max of a non-empty slice in one pass.
fn min_max(values: &[i32]) -> (i32, i32) {
    let mut lo = values[0];
    let mut hi = values[0];
    for &v in &values[1..] {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    (lo, hi)
}

fn median(values: &[i32]) -> i32 {
    let mut sorted: Vec<i32, MAX_MERGE_INPUTS> = Vec::new();
    for &v in values {
        // Capacity equals the validated input list bound.
        let _ = sorted.push(v);
    }
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        mean2_half_even(i64::from(sorted[n / 2 - 1]), i64::from(sorted[n / 2])) as i32
    }
}

/// Mean of two values, rounding halves to even.
fn mean2_half_even(a: i64, b: i64) -> i64 {
    let sum = a + b;
    let floor = sum >> 1;
    if sum & 1 == 0 || floor % 2 == 0 {
        floor
    } else {
        floor + 1
    }
}

fn mean(values: &[i32]) -> i32 {
    let sum: i64 = values.iter().map(|&v| i64::from(v)).sum();
    (sum / values.len() as i64) as i32
}

/// Tolerance-clustered majority vote.
///
/// Each contributing input anchors a cluster of all inputs within the
/// tolerance of it; the largest cluster wins, ties keep the anchor with
/// the lowest input index. The candidate is the winning cluster's mean.
fn majority(values: &[i32], tolerance: i32) -> i32 {
    let mut best_anchor = 0;
    let mut best_size = 0;
    for (i, &a) in values.iter().enumerate() {
        let size = values
            .iter()
            .filter(|&&b| (i64::from(a) - i64::from(b)).abs() <= i64::from(tolerance))
            .count();
        if size > best_size {
            best_size = size;
            best_anchor = i;
        }
    }
    let anchor = values[best_anchor];
    let mut cluster: Vec<i32, MAX_MERGE_INPUTS> = Vec::new();
    for &b in values {
        if (i64::from(anchor) - i64::from(b)).abs() <= i64::from(tolerance) {
            let _ = cluster.push(b);
        }
    }
    mean(&cluster)
}

// ─── Tests ──────────────────────────────────────────────────────────
