//! Capacity limits and defaults shared across the workspace.
//!
//! All runtime state is pre-allocated against these bounds; the engine
//! performs no heap allocation after init.

/// Maximum number of signals a single engine instance can hold.
pub const MAX_SIGNALS: u16 = 256;

/// Maximum number of inputs a single merge may fuse.
pub const MAX_MERGE_INPUTS: usize = 8;

/// Remap point list bounds (strictly increasing input axis).
pub const MIN_REMAP_POINTS: usize = 2;
/// Upper bound on remap control points.
pub const MAX_REMAP_POINTS: usize = 8;

/// Maximum number of cyclic output jobs (binary heap capacity).
pub const MAX_CYCLIC_JOBS: usize = 64;

/// Maximum number of dual-channel safety monitors.
pub const MAX_MONITORS: usize = 16;

/// DTC pool capacity (fixed array + occupancy bitmap).
pub const MAX_DTCS: usize = 32;

/// Lowest (numerically highest) cyclic job priority.
pub const PRIORITY_MAX: u8 = 7;

/// Default engine tick period [µs] (1 kHz).
pub const TICK_PERIOD_US_DEFAULT: u32 = 1_000;
/// Tick period bounds [µs].
pub const TICK_PERIOD_US_MIN: u32 = 100;
/// Upper tick period bound [µs].
pub const TICK_PERIOD_US_MAX: u32 = 1_000_000;

/// Default ISR ring capacity (power of two).
pub const RING_CAPACITY_DEFAULT: usize = 256;
/// Smallest allowed ring capacity.
pub const RING_CAPACITY_MIN: usize = 4;
/// Largest allowed ring capacity.
pub const RING_CAPACITY_MAX: usize = 4096;

/// Default per-tick drain limit (events popped from the ring).
pub const DRAIN_MAX_DEFAULT: usize = 64;

/// Fixed-point gain scale: PID gains are milli-units.
pub const GAIN_SCALE: i64 = 1000;

/// Default J1939 source address.
pub const SOURCE_ADDRESS_DEFAULT: u8 = 0x28;
