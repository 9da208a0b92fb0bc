//! Dual-channel safety crosscheck.
//!
//! Each monitor compares a primary and an independently computed
//! secondary signal. Disagreement beyond the tolerance (or a non-Ok
//! status on either channel) starts a sustained-disagreement window;
//! recovery inside the window returns to Healthy, exhaustion of the
//! window is a terminal failure. The engine asserts the safe state
//! exactly once, on the transition into Failed, and halts.

use sigflow_common::config::MonitorSpec;
use sigflow_common::signal::SignalStatus;

use crate::store::SignalSlot;

/// Per-monitor state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Channels agree and both are Ok.
    Healthy,
    /// Disagreement observed; the window is running.
    Suspect {
        /// When the disagreement started [µs].
        since_us: u64,
    },
    /// Sustained disagreement. Terminal until re-init.
    Failed,
}

/// Outcome of one evaluation, for logging and safe-state hand-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// No state change.
    None,
    /// Healthy → Suspect.
    EnteredSuspect,
    /// Suspect → Healthy inside the window.
    Recovered,
    /// Suspect → Failed. Reported exactly once.
    Failed,
}

/// One configured crosscheck with its runtime state.
#[derive(Debug)]
pub struct CrosscheckMonitor {
    spec: MonitorSpec,
    state: MonitorState,
}

impl CrosscheckMonitor {
    /// Create a monitor in Healthy state.
    pub fn new(spec: MonitorSpec) -> Self {
        Self {
            spec,
            state: MonitorState::Healthy,
        }
    }

    /// Immutable spec access.
    #[inline]
    pub fn spec(&self) -> &MonitorSpec {
        &self.spec
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    /// Whether the monitor has terminally failed.
    #[inline]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, MonitorState::Failed)
    }

    /// Channels agree: both Ok and within tolerance.
    fn agrees(&self, primary: &SignalSlot, secondary: &SignalSlot) -> bool {
        let diff = (i64::from(primary.value) - i64::from(secondary.value)).abs();
        primary.status == SignalStatus::Ok
            && secondary.status == SignalStatus::Ok
            && diff <= i64::from(self.spec.tolerance)
    }

    /// Evaluate the crosscheck for this tick.
    pub fn evaluate(
        &mut self,
        primary: &SignalSlot,
        secondary: &SignalSlot,
        now_us: u64,
    ) -> MonitorEvent {
        match self.state {
            MonitorState::Healthy => {
                if self.agrees(primary, secondary) {
                    MonitorEvent::None
                } else {
                    self.state = MonitorState::Suspect { since_us: now_us };
                    MonitorEvent::EnteredSuspect
                }
            }
            MonitorState::Suspect { since_us } => {
                if self.agrees(primary, secondary) {
                    self.state = MonitorState::Healthy;
                    MonitorEvent::Recovered
                } else if now_us.saturating_sub(since_us) >= self.spec.window_us {
                    self.state = MonitorState::Failed;
                    MonitorEvent::Failed
                } else {
                    MonitorEvent::None
                }
            }
            // Terminal until the engine is re-initialized.
            MonitorState::Failed => MonitorEvent::None,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
