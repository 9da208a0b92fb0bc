//! Diagnostic trouble code registry.
//!
//! Fixed pool with an occupancy bitmap; lookup by `(SPN, FMI)` is a
//! linear scan over the small pool. Every configured fault definition
//! occupies a pool slot from init in `Inactive` state; the remaining
//! slots serve `(SPN, FMI)` pairs first seen at runtime and are reused
//! after `clear`. Occurrence counters are atomic so producer-context
//! code may bump them without taking a lock the engine could contend
//! on.
//!
//! Lifecycle per entry: Inactive → Pending on raise, Pending →
//! Confirmed once the debounce threshold is reached, Confirmed →
//! Stored when the fault is no longer present, Stored → Confirmed on
//! recurrence.
//!
//! Persistence is external: `snapshot`/`restore` expose the pool to an
//! optional boot-time callback.

use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

use sigflow_common::config::{DtcSpec, LampState};
use sigflow_common::consts::MAX_DTCS;

// The occupancy bitmap is a single u64.
const_assert!(MAX_DTCS <= 64);

/// Lifecycle state of a fault entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtcState {
    /// Defined but never raised (or cleared); occupies its pool slot.
    Inactive,
    /// Raised but the debounce threshold has not been reached yet.
    Pending,
    /// Fault is active (debounce threshold reached).
    Confirmed,
    /// Fault was active and is no longer present.
    Stored,
}

/// Public copy of one pool entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtcRecord {
    /// Suspect Parameter Number.
    pub spn: u32,
    /// Failure Mode Identifier.
    pub fmi: u8,
    /// Lamp driven while Confirmed.
    pub lamp: LampState,
    /// Lifecycle state.
    pub state: DtcState,
    /// Occurrence count.
    pub occurrence_count: u16,
    /// First raise [µs]; 0 while Inactive and never raised.
    pub first_seen_us: u64,
    /// Most recent raise [µs].
    pub last_seen_us: u64,
}

/// Serializable snapshot entry for external persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtcSnapshot {
    /// Suspect Parameter Number.
    pub spn: u32,
    /// Failure Mode Identifier.
    pub fmi: u8,
    /// Lifecycle state.
    pub state: DtcState,
    /// Occurrence count.
    pub occurrence_count: u16,
    /// First raise [µs].
    pub first_seen_us: u64,
    /// Most recent raise [µs].
    pub last_seen_us: u64,
}

#[derive(Debug)]
struct PoolEntry {
    spn: u32,
    fmi: u8,
    lamp: LampState,
    confirm_count: u16,
    state: DtcState,
    occurrence_count: AtomicU16,
    first_seen_us: u64,
    last_seen_us: u64,
}

impl PoolEntry {
    fn empty() -> Self {
        Self {
            spn: 0,
            fmi: 0,
            lamp: LampState::Off,
            confirm_count: 1,
            state: DtcState::Inactive,
            occurrence_count: AtomicU16::new(0),
            first_seen_us: 0,
            last_seen_us: 0,
        }
    }

    fn reset_to(&mut self, spn: u32, fmi: u8, lamp: LampState, confirm_count: u16) {
        self.spn = spn;
        self.fmi = fmi;
        self.lamp = lamp;
        self.confirm_count = confirm_count;
        self.state = DtcState::Inactive;
        self.occurrence_count.store(0, Ordering::Relaxed);
        self.first_seen_us = 0;
        self.last_seen_us = 0;
    }

    fn record(&self) -> DtcRecord {
        DtcRecord {
            spn: self.spn,
            fmi: self.fmi,
            lamp: self.lamp,
            state: self.state,
            occurrence_count: self.occurrence_count.load(Ordering::Relaxed),
            first_seen_us: self.first_seen_us,
            last_seen_us: self.last_seen_us,
        }
    }
}

/// Fixed-pool DTC store.
#[derive(Debug)]
pub struct DtcRegistry {
    pool: Box<[PoolEntry]>,
    /// Occupancy bitmap over the pool.
    occupied: u64,
    /// Known fault definitions (lamp, debounce threshold).
    specs: Box<[DtcSpec]>,
}

impl DtcRegistry {
    /// Create a registry with one Inactive pool entry per configured
    /// fault definition. The spec table length is validated against the
    /// pool capacity at config load.
    pub fn new(specs: &[DtcSpec]) -> Self {
        let mut registry = Self {
            pool: (0..MAX_DTCS).map(|_| PoolEntry::empty()).collect(),
            occupied: 0,
            specs: specs.to_vec().into_boxed_slice(),
        };
        registry.seed_configured();
        registry
    }

    /// Allocate the configured definitions into the leading pool slots.
    fn seed_configured(&mut self) {
        for (i, spec) in self.specs.iter().take(self.pool.len()).enumerate() {
            self.pool[i].reset_to(spec.spn, spec.fmi, spec.lamp, spec.confirm_count);
            self.occupied |= 1 << i;
        }
    }

    /// Number of allocated entries (configured definitions included).
    pub fn len(&self) -> usize {
        self.occupied.count_ones() as usize
    }

    /// Whether the pool holds no entries.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    fn find(&self, spn: u32, fmi: u8) -> Option<usize> {
        (0..self.pool.len()).find(|&i| {
            self.occupied & (1 << i) != 0 && self.pool[i].spn == spn && self.pool[i].fmi == fmi
        })
    }

    fn spec_for(&self, spn: u32, fmi: u8) -> Option<&DtcSpec> {
        self.specs.iter().find(|s| s.spn == spn && s.fmi == fmi)
    }

    /// Raise a fault occurrence.
    ///
    /// Configured faults already own a pool slot; an unknown
    /// `(SPN, FMI)` pair allocates a free one (silently dropped when
    /// the pool is exhausted) and debounces with a threshold of one and
    /// no lamp. Pending promotes to Confirmed at the debounce
    /// threshold; a Stored fault that recurs is Confirmed again.
    pub fn raise(&mut self, spn: u32, fmi: u8, now_us: u64) -> Option<DtcRecord> {
        let idx = match self.find(spn, fmi) {
            Some(i) => i,
            None => {
                let free = (0..self.pool.len()).find(|&i| self.occupied & (1 << i) == 0)?;
                self.pool[free].reset_to(spn, fmi, LampState::Off, 1);
                self.occupied |= 1 << free;
                free
            }
        };

        let entry = &mut self.pool[idx];
        let count = entry
            .occurrence_count
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        if count == 1 {
            entry.first_seen_us = now_us;
        }
        entry.last_seen_us = now_us;
        match entry.state {
            DtcState::Inactive => {
                entry.state = if count >= entry.confirm_count {
                    DtcState::Confirmed
                } else {
                    DtcState::Pending
                };
            }
            DtcState::Pending if count >= entry.confirm_count => {
                entry.state = DtcState::Confirmed;
            }
            // A stored fault that recurs becomes active again.
            DtcState::Stored => entry.state = DtcState::Confirmed,
            _ => {}
        }
        Some(entry.record())
    }

    /// Mark a previously confirmed fault as no longer present.
    pub fn set_inactive(&mut self, spn: u32, fmi: u8) {
        if let Some(i) = self.find(spn, fmi) {
            let entry = &mut self.pool[i];
            if entry.state == DtcState::Confirmed {
                entry.state = DtcState::Stored;
            }
        }
    }

    /// Operator clear: configured definitions return to Inactive with
    /// zeroed history, runtime-allocated slots are freed for reuse.
    pub fn clear(&mut self) {
        self.occupied = 0;
        self.seed_configured();
    }

    /// Look up one entry.
    pub fn get(&self, spn: u32, fmi: u8) -> Option<DtcRecord> {
        self.find(spn, fmi).map(|i| self.pool[i].record())
    }

    /// Iterate all allocated entries, Inactive definitions included.
    pub fn iter(&self) -> impl Iterator<Item = DtcRecord> + '_ {
        (0..self.pool.len())
            .filter(|&i| self.occupied & (1 << i) != 0)
            .map(|i| self.pool[i].record())
    }

    /// Iterate Confirmed (active) entries, the DM1 payload set.
    pub fn iter_active(&self) -> impl Iterator<Item = DtcRecord> + '_ {
        self.iter().filter(|r| r.state == DtcState::Confirmed)
    }

    /// Worst lamp across active entries.
    pub fn active_lamp(&self) -> LampState {
        let mut lamp = LampState::Off;
        for r in self.iter_active() {
            lamp = worst_lamp(lamp, r.lamp);
        }
        lamp
    }

    /// Serializable view of the pool for external persistence.
    pub fn snapshot(&self) -> Vec<DtcSnapshot> {
        self.iter()
            .map(|r| DtcSnapshot {
                spn: r.spn,
                fmi: r.fmi,
                state: r.state,
                occurrence_count: r.occurrence_count,
                first_seen_us: r.first_seen_us,
                last_seen_us: r.last_seen_us,
            })
            .collect()
    }

    /// Re-populate the pool from a persisted snapshot (boot time).
    ///
    /// The pool is reset to its init state first; snapshot entries then
    /// overwrite their matching slots, with unknown pairs allocated
    /// from the free slots. Lamp and debounce always come from the
    /// spec table, not the snapshot.
    pub fn restore(&mut self, entries: &[DtcSnapshot]) {
        self.clear();
        for snap in entries {
            let idx = match self.find(snap.spn, snap.fmi) {
                Some(i) => i,
                None => {
                    let Some(free) =
                        (0..self.pool.len()).find(|&i| self.occupied & (1 << i) == 0)
                    else {
                        continue;
                    };
                    self.pool[free].reset_to(snap.spn, snap.fmi, LampState::Off, 1);
                    self.occupied |= 1 << free;
                    free
                }
            };
            let entry = &mut self.pool[idx];
            entry.state = snap.state;
            entry
                .occurrence_count
                .store(snap.occurrence_count, Ordering::Relaxed);
            entry.first_seen_us = snap.first_seen_us;
            entry.last_seen_us = snap.last_seen_us;
        }
    }
}

/// Lamp severity reduction: Red > Amber > Protect > Off.
fn worst_lamp(a: LampState, b: LampState) -> LampState {
    fn rank(l: LampState) -> u8 {
        match l {
            LampState::Off => 0,
            LampState::Protect => 1,
            LampState::Amber => 2,
            LampState::Red => 3,
        }
    }
    if rank(b) > rank(a) { b } else { a }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn specs() -> Vec<DtcSpec> {
        vec![
            DtcSpec {
                spn: 100,
                fmi: 1,
                lamp: LampState::Amber,
                confirm_count: 3,
            },
            DtcSpec {
                spn: 200,
                fmi: 4,
                lamp: LampState::Red,
                confirm_count: 1,
            },
        ]
    }

    #[test]
    fn configured_faults_occupy_pool_from_init() {
        let reg = DtcRegistry::new(&specs());
        assert_eq!(reg.len(), 2);
        assert!(!reg.is_empty());

        let r = reg.get(100, 1).unwrap();
        assert_eq!(r.state, DtcState::Inactive);
        assert_eq!(r.occurrence_count, 0);
        assert_eq!(r.lamp, LampState::Amber);
        assert_eq!(r.first_seen_us, 0);

        // Boot snapshot reflects the whole configured table.
        assert_eq!(reg.snapshot().len(), 2);
        assert_eq!(reg.iter_active().count(), 0);
    }

    #[test]
    fn debounce_promotes_after_threshold() {
        let mut reg = DtcRegistry::new(&specs());

        let r = reg.raise(100, 1, 10).unwrap();
        assert_eq!(r.state, DtcState::Pending);
        assert_eq!(r.occurrence_count, 1);
        assert_eq!(r.first_seen_us, 10);

        reg.raise(100, 1, 20);
        let r = reg.raise(100, 1, 30).unwrap();
        assert_eq!(r.state, DtcState::Confirmed);
        assert_eq!(r.occurrence_count, 3);
        assert_eq!(r.last_seen_us, 30);
    }

    #[test]
    fn immediate_confirm_with_threshold_one() {
        let mut reg = DtcRegistry::new(&specs());
        let r = reg.raise(200, 4, 5).unwrap();
        assert_eq!(r.state, DtcState::Confirmed);
        assert_eq!(r.lamp, LampState::Red);
    }

    #[test]
    fn unknown_pair_gets_defaults() {
        let mut reg = DtcRegistry::new(&specs());
        let r = reg.raise(9999, 12, 0).unwrap();
        assert_eq!(r.state, DtcState::Confirmed);
        assert_eq!(r.lamp, LampState::Off);
        // Allocated beyond the configured table.
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn inactive_then_recurrence() {
        let mut reg = DtcRegistry::new(&specs());
        reg.raise(200, 4, 0);
        reg.set_inactive(200, 4);
        assert_eq!(reg.get(200, 4).unwrap().state, DtcState::Stored);
        assert_eq!(reg.iter_active().count(), 0);

        // Recurrence re-activates and keeps the history.
        let r = reg.raise(200, 4, 100).unwrap();
        assert_eq!(r.state, DtcState::Confirmed);
        assert_eq!(r.occurrence_count, 2);
        assert_eq!(r.first_seen_us, 0);
    }

    #[test]
    fn set_inactive_does_not_touch_pending() {
        let mut reg = DtcRegistry::new(&specs());
        reg.raise(100, 1, 0);
        reg.set_inactive(100, 1);
        // Pending is not Stored: the fault never confirmed.
        assert_eq!(reg.get(100, 1).unwrap().state, DtcState::Pending);
    }

    #[test]
    fn clear_resets_configured_and_frees_runtime_slots() {
        let mut reg = DtcRegistry::new(&specs());
        reg.raise(200, 4, 0);
        reg.raise(9999, 12, 0);
        assert_eq!(reg.len(), 3);

        reg.clear();
        // Configured definitions stay allocated, back to Inactive.
        assert_eq!(reg.len(), 2);
        let r = reg.get(200, 4).unwrap();
        assert_eq!(r.state, DtcState::Inactive);
        assert_eq!(r.occurrence_count, 0);
        // The runtime-allocated entry is gone; its slot is reusable.
        assert!(reg.get(9999, 12).is_none());

        let r = reg.raise(100, 1, 50).unwrap();
        assert_eq!(r.occurrence_count, 1);
        assert_eq!(r.first_seen_us, 50);
    }

    #[test]
    fn pool_exhaustion_drops_new_faults() {
        let mut reg = DtcRegistry::new(&[]);
        for spn in 0..MAX_DTCS as u32 {
            assert!(reg.raise(spn, 0, 0).is_some());
        }
        assert_eq!(reg.len(), MAX_DTCS);
        // Pool full: the new fault is dropped, existing ones still work.
        assert!(reg.raise(9999, 0, 0).is_none());
        assert!(reg.raise(3, 0, 1).is_some());
    }

    #[test]
    fn lamp_aggregation_takes_worst() {
        let mut reg = DtcRegistry::new(&specs());
        assert_eq!(reg.active_lamp(), LampState::Off);
        reg.raise(100, 1, 0);
        reg.raise(100, 1, 1);
        reg.raise(100, 1, 2); // Amber confirmed
        assert_eq!(reg.active_lamp(), LampState::Amber);
        reg.raise(200, 4, 3); // Red confirmed
        assert_eq!(reg.active_lamp(), LampState::Red);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut reg = DtcRegistry::new(&specs());
        reg.raise(200, 4, 10);
        reg.raise(100, 1, 20);
        reg.set_inactive(200, 4);

        let snap = reg.snapshot();
        let mut restored = DtcRegistry::new(&specs());
        restored.restore(&snap);

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(200, 4).unwrap().state, DtcState::Stored);
        assert_eq!(restored.get(100, 1).unwrap().state, DtcState::Pending);
        assert_eq!(restored.get(100, 1).unwrap().occurrence_count, 1);
        // Lamp comes from the spec table, not the snapshot.
        assert_eq!(restored.get(100, 1).unwrap().lamp, LampState::Amber);
    }

    #[test]
    fn restore_preserves_unraised_definitions() {
        let mut reg = DtcRegistry::new(&specs());
        reg.raise(200, 4, 10);
        let snap = reg.snapshot();

        let mut restored = DtcRegistry::new(&specs());
        restored.restore(&snap);
        // The never-raised definition is still present as Inactive.
        assert_eq!(restored.get(100, 1).unwrap().state, DtcState::Inactive);
        assert_eq!(restored.len(), 2);
    }
}
