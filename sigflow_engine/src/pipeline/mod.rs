//! User-configurable pipeline stages.
//!
//! Each stage is a pure function over the signal store plus its own
//! small state. Scale and remap run in phase A of the tick; PID and
//! verified-output run in phase B, after merges, so controllers consume
//! fused values.
//!
//! Stage faults never abort the tick: the output signal is set to
//! `Error` and the loop continues.

pub mod pid;
pub mod remap;
pub mod scale;
pub mod verify;

use sigflow_common::config::PipelineStageSpec;
use sigflow_common::signal::SignalStatus;

use crate::store::SignalStore;
use pid::PidState;

/// Per-stage mutable runtime state, pre-allocated at init.
#[derive(Debug, Clone, Default)]
pub enum StageState {
    /// Scale/remap/verify carry no state.
    #[default]
    Stateless,
    /// PID accumulators and sample bookkeeping.
    Pid(PidState),
}

impl StageState {
    /// Allocate the state matching a stage spec.
    pub fn for_spec(spec: &PipelineStageSpec) -> Self {
        match spec {
            PipelineStageSpec::Pid(_) => Self::Pid(PidState::new()),
            _ => Self::Stateless,
        }
    }
}

/// Outcome of one stage execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageResult {
    /// The stage wrote its output signal.
    pub wrote: bool,
    /// The stage hit a fault (output carries `Error`).
    pub fault: bool,
}

impl StageResult {
    const SKIPPED: Self = Self {
        wrote: false,
        fault: false,
    };
}

/// Execute one stage against the store.
pub fn run_stage(
    spec: &PipelineStageSpec,
    state: &mut StageState,
    store: &mut SignalStore,
    now_us: u64,
) -> StageResult {
    match spec {
        PipelineStageSpec::Scale(s) => {
            let input = *store.slot(s.input);
            let (value, status) = scale::scale(&s.mode, input.value, input.status);
            store.write_with_status(s.output, value, status, now_us);
            StageResult {
                wrote: true,
                fault: status == SignalStatus::Error,
            }
        }
        PipelineStageSpec::Remap(s) => {
            let input = *store.slot(s.input);
            let value = remap::remap(&s.points, input.value);
            store.write_with_status(s.output, value, input.status, now_us);
            StageResult {
                wrote: true,
                fault: false,
            }
        }
        PipelineStageSpec::Pid(s) => {
            if !s.enabled {
                return StageResult::SKIPPED;
            }
            let StageState::Pid(pid_state) = state else {
                // State table mismatch is an init bug; degrade the output.
                store.degrade(s.output, SignalStatus::Error);
                return StageResult {
                    wrote: false,
                    fault: true,
                };
            };
            let setpoint = *store.slot(s.setpoint);
            let measurement = *store.slot(s.measurement);
            match pid::pid_step(pid_state, s, setpoint.value, measurement.value, now_us) {
                Some(output) => {
                    let status = setpoint.status.worst(measurement.status);
                    store.write_with_status(s.output, output, status, now_us);
                    StageResult {
                        wrote: true,
                        fault: false,
                    }
                }
                // Sample interval not yet elapsed.
                None => StageResult::SKIPPED,
            }
        }
        PipelineStageSpec::Verify(s) => {
            let input = *store.slot(s.input);
            let (value, status) = verify::verify(s, input.value, input.status);
            store.write_with_status(s.output, value, status, now_us);
            StageResult {
                wrote: true,
                fault: status == SignalStatus::Error,
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sigflow_common::config::{ScaleMode, ScaleSpec, VerifySpec};

    fn two_point_scale() -> PipelineStageSpec {
        PipelineStageSpec::Scale(ScaleSpec {
            input: 0,
            output: 1,
            mode: ScaleMode::TwoPoint {
                in_min: 0,
                in_max: 1023,
                out_min: 0,
                out_max: 1000,
                clamp: true,
            },
        })
    }

    #[test]
    fn scale_stage_writes_output() {
        let mut store = SignalStore::new(2);
        store.write_fresh(0, 512, 100);
        store.clear_updated();

        let spec = two_point_scale();
        let mut state = StageState::for_spec(&spec);
        let r = run_stage(&spec, &mut state, &mut store, 200);

        assert!(r.wrote);
        assert!(!r.fault);
        assert_eq!(store.slot(1).value, 501);
        assert_eq!(store.slot(1).timestamp_us, 200);
        assert!(store.slot(1).flags.contains(crate::store::SlotFlags::UPDATED));
    }

    #[test]
    fn verify_stage_flags_violation() {
        let spec = PipelineStageSpec::Verify(VerifySpec {
            input: 0,
            output: 1,
            min: 0,
            max: 100,
            error_on_violation: true,
        });
        let mut store = SignalStore::new(2);
        store.write_fresh(0, 250, 0);

        let mut state = StageState::for_spec(&spec);
        let r = run_stage(&spec, &mut state, &mut store, 1);
        assert!(r.fault);
        assert_eq!(store.slot(1).value, 100);
        assert_eq!(store.slot(1).status, SignalStatus::Error);
    }
}
