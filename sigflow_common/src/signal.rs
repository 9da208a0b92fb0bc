//! Signal identity, health status, and the ISR hand-off event.
//!
//! A signal is a dense-id integer datum with a health status and a
//! monotonic timestamp. Values are 32-bit signed fixed-point; the scale
//! is caller-defined and never interpreted by the engine.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Dense signal identifier (0..signal_count).
///
/// Ids are stable and allocated by the offline generator; the engine
/// never creates or destroys signals at runtime.
pub type SignalId = u16;

// ─── Health Status ──────────────────────────────────────────────────

/// Health status of a signal value.
///
/// Ordering of the variants encodes severity: later variants are worse.
/// [`SignalStatus::worst`] reduces two statuses to the more severe one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Value is fresh and trustworthy.
    #[default]
    Ok,
    /// Value is usable but impaired (stale contributor, clamped output).
    Degraded,
    /// Value violated its configured range.
    OutOfRange,
    /// Redundant inputs disagree beyond tolerance.
    Inconsistent,
    /// Value is older than its staleness threshold.
    Timeout,
    /// Producer or stage fault; value must not be trusted.
    Error,
}

impl SignalStatus {
    /// Whether the value may contribute to fusion and control.
    #[inline]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Ok | Self::Degraded)
    }

    /// Reduce two statuses to the more severe one.
    #[inline]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

impl std::fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::OutOfRange => "out_of_range",
            Self::Inconsistent => "inconsistent",
            Self::Timeout => "timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ─── Staleness Policy ───────────────────────────────────────────────

/// What status a signal takes when its timestamp exceeds the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Stale signals become [`SignalStatus::Timeout`].
    #[default]
    Timeout,
    /// Stale signals become [`SignalStatus::Degraded`].
    Degraded,
}

impl StalePolicy {
    /// Status applied by the staleness pass.
    #[inline]
    pub const fn status(self) -> SignalStatus {
        match self {
            Self::Timeout => SignalStatus::Timeout,
            Self::Degraded => SignalStatus::Degraded,
        }
    }
}

// ─── Hardware Event ─────────────────────────────────────────────────

/// One `(signal, raw value, producer timestamp)` triple carried from an
/// ISR to the engine through the ring.
///
/// Purely a message; the engine does not re-timestamp on drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct HwEvent {
    /// Target signal id.
    pub signal_id: SignalId,
    /// Padding for field alignment.
    pub _pad: u16,
    /// Raw value as produced (fixed-point, caller-defined scale).
    pub value: i32,
    /// Producer's `now_us()` at push time [µs].
    pub timestamp_us: u64,
}

const_assert_eq!(core::mem::size_of::<HwEvent>(), 16);

impl HwEvent {
    /// Construct an event.
    #[inline]
    pub const fn new(signal_id: SignalId, value: i32, timestamp_us: u64) -> Self {
        Self {
            signal_id,
            _pad: 0,
            value,
            timestamp_us,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
