//! Linear scale stage.
//!
//! Two-point mode maps an input range onto an output range with 64-bit
//! intermediates; the interpolation product divides rounding up, which
//! keeps full-scale codes exact (a 10-bit ADC at 512 of 0..=1023 scales
//! to 501 of 0..=1000). Gain/offset mode applies a milli-unit gain and
//! an offset with truncating division.
//!
//! Output inherits the input status unless clamping saturates (then at
//! least `Degraded`). A degenerate two-point range (`in_min == in_max`)
//! yields `out_min` with `Error` status.

use sigflow_common::config::ScaleMode;
use sigflow_common::consts::GAIN_SCALE;
use sigflow_common::signal::SignalStatus;

/// Signed division rounding toward +infinity.
#[inline]
fn div_ceil_i64(num: i64, den: i64) -> i64 {
    let q = num / den;
    if num % den != 0 && ((num < 0) == (den < 0)) {
        q + 1
    } else {
        q
    }
}

/// Saturating narrowing to the signal value domain.
#[inline]
fn to_i32_saturating(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Apply a scale mode to one value. Returns `(value, status)`.
pub fn scale(mode: &ScaleMode, value: i32, input_status: SignalStatus) -> (i32, SignalStatus) {
    match *mode {
        ScaleMode::TwoPoint {
            in_min,
            in_max,
            out_min,
            out_max,
            clamp,
        } => {
            if in_min == in_max {
                return (out_min, SignalStatus::Error);
            }
            let num = i64::from(value) - i64::from(in_min);
            let span_out = i64::from(out_max) - i64::from(out_min);
            let span_in = i64::from(in_max) - i64::from(in_min);
            let raw = div_ceil_i64(num * span_out, span_in) + i64::from(out_min);

            if clamp {
                let lo = i64::from(out_min.min(out_max));
                let hi = i64::from(out_min.max(out_max));
                if raw < lo || raw > hi {
                    let clamped = raw.clamp(lo, hi) as i32;
                    return (clamped, input_status.worst(SignalStatus::Degraded));
                }
            }
            (to_i32_saturating(raw), input_status)
        }
        ScaleMode::GainOffset {
            scale_q,
            offset,
            clamp_min,
            clamp_max,
        } => {
            let raw = i64::from(value) * i64::from(scale_q) / GAIN_SCALE + i64::from(offset);
            let mut out = raw;
            let mut saturated = false;
            if let Some(lo) = clamp_min {
                if out < i64::from(lo) {
                    out = i64::from(lo);
                    saturated = true;
                }
            }
            if let Some(hi) = clamp_max {
                if out > i64::from(hi) {
                    out = i64::from(hi);
                    saturated = true;
                }
            }
            let status = if saturated {
                input_status.worst(SignalStatus::Degraded)
            } else {
                input_status
            };
            (to_i32_saturating(out), status)
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
