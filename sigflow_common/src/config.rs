//! Immutable configuration tables (the offline generator's artifact).
//!
//! The generator resolves the device-tree topology offline and emits one
//! TOML document deserialized into [`EngineConfig`]. All tables are
//! immutable after engine init. Field-level bounds live here as per-type
//! `validate()`; cross-table rules (disjoint writers, id ranges) are
//! enforced by the engine loader.
//!
//! Optional fields use `#[serde(default)]` for forward-compatible
//! deserialization.

use serde::{Deserialize, Serialize};

use crate::consts::{
    DRAIN_MAX_DEFAULT, MAX_MERGE_INPUTS, MAX_REMAP_POINTS, MIN_REMAP_POINTS, PRIORITY_MAX,
    RING_CAPACITY_DEFAULT, RING_CAPACITY_MAX, RING_CAPACITY_MIN, SOURCE_ADDRESS_DEFAULT,
    TICK_PERIOD_US_DEFAULT, TICK_PERIOD_US_MAX, TICK_PERIOD_US_MIN,
};
use crate::signal::{SignalId, SignalStatus, StalePolicy};

// ─── Engine Settings ────────────────────────────────────────────────

/// Top-level engine settings (`[engine]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Number of signals (ids are dense 0..signal_count).
    pub signal_count: u16,

    /// Engine tick period [µs] (default: 1000 = 1 kHz).
    #[serde(default = "default_tick_period_us")]
    pub tick_period_us: u32,

    /// ISR ring capacity; must be a power of two (default: 256).
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,

    /// Maximum events drained from the ring per tick (default: 64).
    #[serde(default = "default_drain_max")]
    pub drain_max: usize,

    /// J1939 source address placed in assembled CAN identifiers.
    #[serde(default = "default_source_address")]
    pub source_address: u8,

    /// CAN bus index used for cyclic and on-change CAN outputs.
    #[serde(default)]
    pub can_bus: u8,
}

fn default_tick_period_us() -> u32 {
    TICK_PERIOD_US_DEFAULT
}
fn default_ring_capacity() -> usize {
    RING_CAPACITY_DEFAULT
}
fn default_drain_max() -> usize {
    DRAIN_MAX_DEFAULT
}
fn default_source_address() -> u8 {
    SOURCE_ADDRESS_DEFAULT
}

impl EngineSettings {
    /// Validate parameter bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.signal_count == 0 || self.signal_count > crate::consts::MAX_SIGNALS {
            return Err(format!(
                "signal_count {} out of range [1, {}]",
                self.signal_count,
                crate::consts::MAX_SIGNALS
            ));
        }
        if self.tick_period_us < TICK_PERIOD_US_MIN || self.tick_period_us > TICK_PERIOD_US_MAX {
            return Err(format!(
                "tick_period_us {} out of range [{}, {}]",
                self.tick_period_us, TICK_PERIOD_US_MIN, TICK_PERIOD_US_MAX
            ));
        }
        if !self.ring_capacity.is_power_of_two()
            || self.ring_capacity < RING_CAPACITY_MIN
            || self.ring_capacity > RING_CAPACITY_MAX
        {
            return Err(format!(
                "ring_capacity {} must be a power of two in [{}, {}]",
                self.ring_capacity, RING_CAPACITY_MIN, RING_CAPACITY_MAX
            ));
        }
        if self.drain_max == 0 {
            return Err("drain_max must be > 0".into());
        }
        Ok(())
    }
}

// ─── Staleness ──────────────────────────────────────────────────────

/// Per-signal staleness threshold (`[[staleness]]` table).
///
/// A threshold of 0 disables the check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StalenessSpec {
    /// Signal the threshold applies to.
    pub signal: SignalId,
    /// Staleness window [µs]; 0 = never stale.
    pub stale_us: u64,
    /// Status applied when the window is exceeded.
    #[serde(default)]
    pub policy: StalePolicy,
}

// ─── Pipeline Stages ────────────────────────────────────────────────

/// Linear scale operating mode.
///
/// Two-point mode maps `[in_min, in_max]` onto `[out_min, out_max]`;
/// gain/offset mode computes `value * scale_q / 1000 + offset`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleMode {
    /// Two-point interpolation with optional clamping.
    TwoPoint {
        /// Input range lower bound.
        in_min: i32,
        /// Input range upper bound.
        in_max: i32,
        /// Output range lower bound.
        out_min: i32,
        /// Output range upper bound.
        out_max: i32,
        /// Clamp the result to the output range.
        #[serde(default = "default_true")]
        clamp: bool,
    },
    /// Gain/offset with milli-unit gain and optional clamps.
    GainOffset {
        /// Gain in milli-units (1000 = unity).
        scale_q: i32,
        /// Additive offset applied after the gain.
        offset: i32,
        /// Optional lower clamp.
        #[serde(default)]
        clamp_min: Option<i32>,
        /// Optional upper clamp.
        #[serde(default)]
        clamp_max: Option<i32>,
    },
}

fn default_true() -> bool {
    true
}

/// Linear scale stage spec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScaleSpec {
    /// Input signal.
    pub input: SignalId,
    /// Output signal.
    pub output: SignalId,
    /// Operating mode.
    #[serde(flatten)]
    pub mode: ScaleMode,
}

/// Piecewise-linear remap stage spec.
///
/// The point list must be strictly increasing in input; interpolation
/// uses 64-bit intermediates, inputs outside the table saturate to the
/// first/last point's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapSpec {
    /// Input signal.
    pub input: SignalId,
    /// Output signal.
    pub output: SignalId,
    /// Control points `(input, output)`, 2..=8 entries.
    pub points: Vec<(i32, i32)>,
}

impl RemapSpec {
    /// Validate point count and strict monotonicity of the input axis.
    pub fn validate(&self) -> Result<(), String> {
        if self.points.len() < MIN_REMAP_POINTS || self.points.len() > MAX_REMAP_POINTS {
            return Err(format!(
                "remap {}→{}: {} points, expected {}..={}",
                self.input,
                self.output,
                self.points.len(),
                MIN_REMAP_POINTS,
                MAX_REMAP_POINTS
            ));
        }
        for w in self.points.windows(2) {
            if w[1].0 <= w[0].0 {
                return Err(format!(
                    "remap {}→{}: input axis not strictly increasing at x={}",
                    self.input, self.output, w[1].0
                ));
            }
        }
        Ok(())
    }
}

/// Discrete PID stage spec. Gains are milli-units (scaled by 1000).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidSpec {
    /// Setpoint signal.
    pub setpoint: SignalId,
    /// Measurement (feedback) signal.
    pub measurement: SignalId,
    /// Output signal.
    pub output: SignalId,
    /// Proportional gain [milli-units].
    pub kp_m: i32,
    /// Integral gain [milli-units].
    pub ki_m: i32,
    /// Derivative gain [milli-units].
    pub kd_m: i32,
    /// Output lower clamp.
    pub out_min: i32,
    /// Output upper clamp.
    pub out_max: i32,
    /// Integral accumulator lower clamp.
    pub integral_min: i64,
    /// Integral accumulator upper clamp.
    pub integral_max: i64,
    /// Error deadband; |error| <= deadband is treated as zero.
    #[serde(default)]
    pub deadband: i32,
    /// Minimum step interval [µs]; the stage is skipped below it.
    pub sample_time_us: u64,
    /// Zero the integral and re-seed on setpoint change.
    #[serde(default)]
    pub reset_on_setpoint_change: bool,
    /// Stage enable; a disabled stage holds its output.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PidSpec {
    /// Validate clamp ordering and sample time.
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_time_us == 0 {
            return Err(format!("pid →{}: sample_time_us must be > 0", self.output));
        }
        if self.out_min > self.out_max {
            return Err(format!(
                "pid →{}: out_min {} > out_max {}",
                self.output, self.out_min, self.out_max
            ));
        }
        if self.integral_min > self.integral_max {
            return Err(format!(
                "pid →{}: integral_min {} > integral_max {}",
                self.output, self.integral_min, self.integral_max
            ));
        }
        if self.deadband < 0 {
            return Err(format!("pid →{}: deadband must be >= 0", self.output));
        }
        Ok(())
    }
}

/// Verified-output stage spec: pass-through with range validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerifySpec {
    /// Input signal.
    pub input: SignalId,
    /// Output signal.
    pub output: SignalId,
    /// Allowed range lower bound.
    pub min: i32,
    /// Allowed range upper bound.
    pub max: i32,
    /// Emit `Error` instead of `OutOfRange` on violation.
    #[serde(default)]
    pub error_on_violation: bool,
}

impl VerifySpec {
    /// Validate range ordering.
    pub fn validate(&self) -> Result<(), String> {
        if self.min > self.max {
            return Err(format!(
                "verify {}→{}: min {} > max {}",
                self.input, self.output, self.min, self.max
            ));
        }
        Ok(())
    }
}

/// One pipeline stage (`[[stage]]` table, tagged by `type`).
///
/// Scale and remap stages run in phase A of the tick (before merges);
/// PID and verify stages run in phase B (after merges), so controllers
/// see fused values rather than raw ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineStageSpec {
    /// Linear scale.
    Scale(ScaleSpec),
    /// Piecewise-linear remap.
    Remap(RemapSpec),
    /// Discrete PID controller.
    Pid(PidSpec),
    /// Range-verified pass-through.
    Verify(VerifySpec),
}

impl PipelineStageSpec {
    /// Signal written by this stage.
    pub fn output(&self) -> SignalId {
        match self {
            Self::Scale(s) => s.output,
            Self::Remap(s) => s.output,
            Self::Pid(s) => s.output,
            Self::Verify(s) => s.output,
        }
    }

    /// Signals read by this stage.
    pub fn inputs(&self) -> impl Iterator<Item = SignalId> + '_ {
        let (a, b) = match self {
            Self::Scale(s) => (s.input, None),
            Self::Remap(s) => (s.input, None),
            Self::Pid(s) => (s.setpoint, Some(s.measurement)),
            Self::Verify(s) => (s.input, None),
        };
        core::iter::once(a).chain(b)
    }

    /// Whether the stage runs in phase A (scale/remap) or phase B.
    pub fn is_phase_a(&self) -> bool {
        matches!(self, Self::Scale(_) | Self::Remap(_))
    }

    /// Per-type field validation.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Scale(_) => Ok(()),
            Self::Remap(s) => s.validate(),
            Self::Pid(s) => s.validate(),
            Self::Verify(s) => s.validate(),
        }
    }
}

// ─── Merge / Voter ──────────────────────────────────────────────────

/// Voting method for N-to-1 fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteMethod {
    /// Middle of sorted values; even counts take the half-to-even mean
    /// of the two middle elements.
    Median,
    /// Integer mean over a 64-bit sum.
    Average,
    /// Smallest contributing value.
    Min,
    /// Largest contributing value.
    Max,
    /// Tolerance-clustered majority; candidate is the winning cluster's
    /// mean.
    Majority,
}

/// Behavior when only a single fresh input remains out of several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Emit the surviving value with `Degraded` status.
    #[default]
    Degrade,
    /// Emit the surviving value with its own status.
    FallBack,
}

/// N-to-1 fusion spec (`[[merge]]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSpec {
    /// Output signal.
    pub output: SignalId,
    /// Ordered input signals (1..=8).
    pub inputs: Vec<SignalId>,
    /// Voting method.
    pub method: VoteMethod,
    /// Agreement tolerance (signal units).
    pub tolerance: i32,
    /// Per-input freshness window [µs]; 0 = no age gating.
    #[serde(default)]
    pub stale_us: u64,
    /// Status emitted when the tolerance check fails.
    #[serde(default = "default_violation_status")]
    pub violation_status: SignalStatus,
    /// Behavior with a single surviving input.
    #[serde(default)]
    pub quorum_policy: QuorumPolicy,
}

fn default_violation_status() -> SignalStatus {
    SignalStatus::Inconsistent
}

impl MergeSpec {
    /// Validate input list bounds and tolerance sign.
    pub fn validate(&self) -> Result<(), String> {
        if self.inputs.is_empty() {
            return Err(format!("merge →{}: empty input list", self.output));
        }
        if self.inputs.len() > MAX_MERGE_INPUTS {
            return Err(format!(
                "merge →{}: {} inputs exceeds max {}",
                self.output,
                self.inputs.len(),
                MAX_MERGE_INPUTS
            ));
        }
        if self.tolerance < 0 {
            return Err(format!("merge →{}: tolerance must be >= 0", self.output));
        }
        Ok(())
    }
}

// ─── Outputs ────────────────────────────────────────────────────────

/// Physical/protocol output family for emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Raw CAN frame; target is the 11/29-bit identifier.
    Can,
    /// J1939; target is the PGN, the identifier is assembled.
    J1939,
    /// CANopen PDO; target is the COB-ID.
    CanOpen,
    /// GPIO pin; nonzero drives high.
    Gpio,
    /// UART; delivered via the custom sink.
    Uart,
    /// SPI; delivered via the custom sink.
    Spi,
    /// I2C; delivered via the custom sink.
    I2c,
    /// PWM channel; value is the duty [0..=10000].
    Pwm,
    /// DAC channel; value is the raw code.
    Dac,
    /// Modbus register; delivered via the custom sink.
    Modbus,
}

/// Deadline-scheduled output job (`[[cyclic]]` table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CyclicJobSpec {
    /// Signal whose current value is emitted.
    pub source: SignalId,
    /// Output family.
    pub kind: OutputKind,
    /// Kind-specific target id (PGN, COB-ID, pin, channel, ...).
    pub target: u32,
    /// Emission period [µs].
    pub period_us: u64,
    /// Priority 0 (highest) ..= 7 (lowest); deadline tie-break.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Initial deadline offset from engine start [µs].
    #[serde(default)]
    pub phase_offset_us: u64,
    /// Payload length [bytes], 1..=8, little-endian right-aligned.
    #[serde(default = "default_length")]
    pub length: u8,
}

fn default_priority() -> u8 {
    3
}
fn default_length() -> u8 {
    2
}

impl CyclicJobSpec {
    /// Validate period, priority, and payload length.
    pub fn validate(&self) -> Result<(), String> {
        if self.period_us == 0 {
            return Err(format!("cyclic {}: period_us must be > 0", self.source));
        }
        if self.priority > PRIORITY_MAX {
            return Err(format!(
                "cyclic {}: priority {} out of range [0, {}]",
                self.source, self.priority, PRIORITY_MAX
            ));
        }
        if self.length == 0 || self.length > 8 {
            return Err(format!(
                "cyclic {}: length {} out of range [1, 8]",
                self.source, self.length
            ));
        }
        Ok(())
    }
}

/// Event-driven output subscription (`[[on_change]]` table).
///
/// Emitted in tick step 7 for every subscribed signal whose
/// updated-this-tick flag is set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OnChangeSpec {
    /// Watched signal.
    pub signal: SignalId,
    /// Output family.
    pub kind: OutputKind,
    /// Kind-specific target id.
    pub target: u32,
    /// Payload length [bytes], 1..=8.
    #[serde(default = "default_length")]
    pub length: u8,
}

impl OnChangeSpec {
    /// Validate payload length.
    pub fn validate(&self) -> Result<(), String> {
        if self.length == 0 || self.length > 8 {
            return Err(format!(
                "on_change {}: length {} out of range [1, 8]",
                self.signal, self.length
            ));
        }
        Ok(())
    }
}

// ─── Safety Monitor ─────────────────────────────────────────────────

/// Dual-channel crosscheck spec (`[[monitor]]` table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Primary channel signal.
    pub primary: SignalId,
    /// Independently computed secondary channel signal.
    pub secondary: SignalId,
    /// Allowed disagreement (signal units).
    pub tolerance: i32,
    /// Sustained-disagreement window [µs] before Failed.
    pub window_us: u64,
    /// GPIO asserted high exactly once on failure.
    #[serde(default)]
    pub safe_gpio: Option<u32>,
}

impl MonitorSpec {
    /// Validate window and tolerance.
    pub fn validate(&self) -> Result<(), String> {
        if self.window_us == 0 {
            return Err(format!(
                "monitor {}/{}: window_us must be > 0",
                self.primary, self.secondary
            ));
        }
        if self.tolerance < 0 {
            return Err(format!(
                "monitor {}/{}: tolerance must be >= 0",
                self.primary, self.secondary
            ));
        }
        Ok(())
    }
}

/// Safe-state output driven when the engine halts on a safety failure
/// (`[[safe_output]]` table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafeOutputSpec {
    /// Output family (GPIO, PWM, DAC, CAN).
    pub kind: OutputKind,
    /// Kind-specific target id.
    pub target: u32,
    /// Safe value to drive.
    pub value: i32,
}

// ─── DTC ────────────────────────────────────────────────────────────

/// J1939 lamp classification for a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LampState {
    /// No lamp.
    #[default]
    Off,
    /// Red stop lamp.
    Red,
    /// Amber warning lamp.
    Amber,
    /// Protect lamp.
    Protect,
}

/// Known diagnostic trouble code (`[[dtc]]` table).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DtcSpec {
    /// Suspect Parameter Number.
    pub spn: u32,
    /// Failure Mode Identifier (0..=31).
    pub fmi: u8,
    /// Lamp driven while the fault is active.
    #[serde(default)]
    pub lamp: LampState,
    /// Occurrences before Pending promotes to Confirmed.
    #[serde(default = "default_confirm_count")]
    pub confirm_count: u16,
}

fn default_confirm_count() -> u16 {
    1
}

impl DtcSpec {
    /// Validate FMI range and confirmation threshold.
    pub fn validate(&self) -> Result<(), String> {
        if self.fmi > 31 {
            return Err(format!("dtc {}: fmi {} out of range [0, 31]", self.spn, self.fmi));
        }
        if self.confirm_count == 0 {
            return Err(format!("dtc {}: confirm_count must be > 0", self.spn));
        }
        Ok(())
    }
}

// ─── Top-Level Config ───────────────────────────────────────────────

/// Complete generator artifact: every table the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine settings.
    pub engine: EngineSettings,
    /// Per-signal staleness thresholds.
    #[serde(default)]
    pub staleness: Vec<StalenessSpec>,
    /// Pipeline stages in configuration order.
    #[serde(default)]
    pub stage: Vec<PipelineStageSpec>,
    /// Merges in configuration order.
    #[serde(default)]
    pub merge: Vec<MergeSpec>,
    /// Cyclic output jobs.
    #[serde(default)]
    pub cyclic: Vec<CyclicJobSpec>,
    /// On-change output subscriptions.
    #[serde(default)]
    pub on_change: Vec<OnChangeSpec>,
    /// Dual-channel safety monitors.
    #[serde(default)]
    pub monitor: Vec<MonitorSpec>,
    /// Safe-state outputs driven on safety halt.
    #[serde(default)]
    pub safe_output: Vec<SafeOutputSpec>,
    /// Known DTC definitions.
    #[serde(default)]
    pub dtc: Vec<DtcSpec>,
}

impl EngineConfig {
    /// Parse a generator artifact from TOML (field validation included).
    pub fn from_toml(toml_src: &str) -> Result<Self, String> {
        let cfg: Self = toml::from_str(toml_src).map_err(|e| e.to_string())?;
        cfg.validate_fields()?;
        Ok(cfg)
    }

    /// Run all per-type field validations.
    ///
    /// Cross-table rules (id ranges, disjoint writers, pool capacities)
    /// are enforced by the engine loader, which sees all tables at once.
    pub fn validate_fields(&self) -> Result<(), String> {
        self.engine.validate()?;
        for s in &self.stage {
            s.validate()?;
        }
        for m in &self.merge {
            m.validate()?;
        }
        for j in &self.cyclic {
            j.validate()?;
        }
        for o in &self.on_change {
            o.validate()?;
        }
        for m in &self.monitor {
            m.validate()?;
        }
        for d in &self.dtc {
            d.validate()?;
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_settings_bounds() {
        let mut s = EngineSettings {
            signal_count: 16,
            tick_period_us: 1_000,
            ring_capacity: 256,
            drain_max: 64,
            source_address: 0x28,
            can_bus: 0,
        };
        assert!(s.validate().is_ok());

        s.ring_capacity = 100; // not a power of two
        assert!(s.validate().is_err());
        s.ring_capacity = 256;

        s.signal_count = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn remap_monotonicity() {
        let mut r = RemapSpec {
            input: 0,
            output: 1,
            points: vec![(0, 0), (100, 50), (200, 400)],
        };
        assert!(r.validate().is_ok());

        r.points = vec![(0, 0), (100, 50), (100, 60)];
        assert!(r.validate().is_err());

        r.points = vec![(0, 0)];
        assert!(r.validate().is_err());
    }

    #[test]
    fn merge_input_bounds() {
        let mut m = MergeSpec {
            output: 3,
            inputs: vec![0, 1, 2],
            method: VoteMethod::Median,
            tolerance: 50,
            stale_us: 0,
            violation_status: SignalStatus::Inconsistent,
            quorum_policy: QuorumPolicy::Degrade,
        };
        assert!(m.validate().is_ok());

        m.inputs.clear();
        assert!(m.validate().is_err());

        m.inputs = (0..9).collect();
        assert!(m.validate().is_err());
    }

    #[test]
    fn cyclic_priority_range() {
        let mut j = CyclicJobSpec {
            source: 10,
            kind: OutputKind::J1939,
            target: 61444,
            period_us: 100_000,
            priority: 3,
            phase_offset_us: 0,
            length: 2,
        };
        assert!(j.validate().is_ok());

        j.priority = 8;
        assert!(j.validate().is_err());
        j.priority = 3;

        j.length = 9;
        assert!(j.validate().is_err());
    }

    #[test]
    fn stage_toml_round_trip() {
        let toml_src = r#"
            [engine]
            signal_count = 8

            [[stage]]
            type = "scale"
            input = 0
            output = 1
            in_min = 0
            in_max = 1023
            out_min = 0
            out_max = 1000

            [[stage]]
            type = "pid"
            setpoint = 2
            measurement = 1
            output = 3
            kp_m = 500
            ki_m = 100
            kd_m = 50
            out_min = 0
            out_max = 1000
            integral_min = -100000
            integral_max = 100000
            sample_time_us = 100000

            [[merge]]
            output = 5
            inputs = [0, 1]
            method = "median"
            tolerance = 50
        "#;
        let cfg: EngineConfig = toml::from_str(toml_src).expect("parse");
        assert_eq!(cfg.stage.len(), 2);
        assert!(cfg.stage[0].is_phase_a());
        assert!(!cfg.stage[1].is_phase_a());
        assert_eq!(cfg.stage[1].output(), 3);
        assert_eq!(cfg.merge[0].method, VoteMethod::Median);
        assert_eq!(cfg.merge[0].violation_status, SignalStatus::Inconsistent);
        assert_eq!(cfg.merge[0].quorum_policy, QuorumPolicy::Degrade);
        assert!(cfg.validate_fields().is_ok());
    }

    #[test]
    fn scale_mode_untagged_forms() {
        let two_point = r#"
            input = 0
            output = 1
            in_min = 0
            in_max = 100
            out_min = 0
            out_max = 1000
        "#;
        let s: ScaleSpec = toml::from_str(two_point).expect("two-point");
        assert!(matches!(s.mode, ScaleMode::TwoPoint { clamp: true, .. }));

        let gain = r#"
            input = 0
            output = 1
            scale_q = 1500
            offset = -20
        "#;
        let s: ScaleSpec = toml::from_str(gain).expect("gain/offset");
        assert!(matches!(
            s.mode,
            ScaleMode::GainOffset {
                scale_q: 1500,
                offset: -20,
                ..
            }
        ));
    }
}
