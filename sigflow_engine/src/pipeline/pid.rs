//! Fixed-step discrete PID with integer fixed-point gains.
//!
//! Gains are milli-units (kp_m = 1500 means 1.5). The derivative acts
//! on the measurement, not the error, so setpoint steps do not kick the
//! output. Anti-windup is back-calculation: on output saturation the
//! excess is removed from the integral accumulator.
//!
//! Zero ki_m disables integral accumulation.

use sigflow_common::config::PidSpec;
use sigflow_common::consts::GAIN_SCALE;

/// Internal state of one PID stage.
///
/// Zeroed at init; the integral is also zeroed when a setpoint change
/// triggers a reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    /// Integral accumulator (milli-unit-scaled error·time).
    pub integral: i64,
    /// Previous measurement (for derivative-on-measurement).
    pub last_measurement: i32,
    /// Previous setpoint (for reset-on-change detection).
    pub last_setpoint: i32,
    /// Timestamp of the last executed step [µs].
    pub last_us: u64,
    /// True until the first executed step (dt is seeded).
    pub first_run: bool,
}

impl PidState {
    /// Fresh state ready for the first step.
    pub fn new() -> Self {
        Self {
            first_run: true,
            ..Self::default()
        }
    }

    /// Reset all internal state to the post-init condition.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Execute one PID step.
///
/// Returns `None` when the sample interval has not elapsed (the stage
/// holds its output). The first step after init or reset seeds
/// `dt_us = sample_time_us`.
pub fn pid_step(
    state: &mut PidState,
    spec: &PidSpec,
    setpoint: i32,
    measurement: i32,
    now_us: u64,
) -> Option<i32> {
    if spec.reset_on_setpoint_change && !state.first_run && setpoint != state.last_setpoint {
        state.integral = 0;
        state.first_run = true;
    }

    let dt_us = if state.first_run {
        spec.sample_time_us
    } else {
        let dt = now_us.saturating_sub(state.last_us);
        if dt < spec.sample_time_us {
            return None;
        }
        dt
    };
    let dt = dt_us as i64;

    // Error with deadband.
    let mut e = i64::from(setpoint) - i64::from(measurement);
    if e.abs() <= i64::from(spec.deadband) {
        e = 0;
    }

    // Integral (disabled accumulator stays at zero when ki_m == 0).
    if spec.ki_m != 0 {
        state.integral = (state.integral + e * dt / GAIN_SCALE)
            .clamp(spec.integral_min, spec.integral_max);
    } else {
        state.integral = 0;
    }

    // Derivative on measurement.
    let d = -(i64::from(measurement) - i64::from(state.last_measurement)) * 1_000_000 / dt;

    let raw = (i64::from(spec.kp_m) * e
        + i64::from(spec.ki_m) * state.integral
        + i64::from(spec.kd_m) * d)
        / GAIN_SCALE;
    let out = raw.clamp(i64::from(spec.out_min), i64::from(spec.out_max));

    // Back-calculation anti-windup: remove the saturation excess from
    // the accumulator so it cannot wind past the output range.
    if raw != out && spec.ki_m != 0 {
        let excess = raw - out;
        state.integral = (state.integral - excess * GAIN_SCALE / i64::from(spec.ki_m))
            .clamp(spec.integral_min, spec.integral_max);
    }

    state.last_measurement = measurement;
    state.last_setpoint = setpoint;
    state.last_us = now_us;
    state.first_run = false;

    Some(out as i32)
}

// ─── Tests ──────────────────────────────────────────────────────────
