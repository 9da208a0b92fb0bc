//! PID step micro-benchmark.
//!
//! Measures the hottest per-stage computation in the tick: one PID
//! step with integral clamping and anti-windup active.

use criterion::{Criterion, criterion_group, criterion_main};

use sigflow_common::config::PidSpec;
use sigflow_engine::pipeline::pid::{PidState, pid_step};

fn reference_spec() -> PidSpec {
    PidSpec {
        setpoint: 0,
        measurement: 1,
        output: 2,
        kp_m: 500,
        ki_m: 100,
        kd_m: 50,
        out_min: -10_000,
        out_max: 10_000,
        integral_min: -1_000_000,
        integral_max: 1_000_000,
        deadband: 2,
        sample_time_us: 1_000,
        reset_on_setpoint_change: false,
        enabled: true,
    }
}

fn bench_pid_step(c: &mut Criterion) {
    let spec = reference_spec();

    c.bench_function("pid_step", |b| {
        let mut state = PidState::new();
        let mut now = 0u64;
        let mut measurement = 0i32;
        b.iter(|| {
            now += 1_000;
            // Sawtooth measurement keeps every term active.
            measurement = (measurement + 7) % 2_000;
            pid_step(&mut state, &spec, 1_000, measurement, now)
        });
    });

    c.bench_function("pid_step_saturating", |b| {
        let mut state = PidState::new();
        let mut now = 0u64;
        b.iter(|| {
            now += 1_000;
            // Large error keeps the anti-windup path hot.
            pid_step(&mut state, &spec, 1_000_000, 0, now)
        });
    });
}

criterion_group!(benches, bench_pid_step);
criterion_main!(benches);
