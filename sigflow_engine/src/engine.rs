//! Engine: single-owner state machine driven by a periodic tick.
//!
//! One `Engine` value owns every piece of mutable state (signal store,
//! stage state, deadlines, monitors, DTC pool). ISRs hold only a ring
//! producer handle. The tick is a deterministic sequence users rely on:
//!
//! 1. Drain the ISR ring (up to `drain_max` events).
//! 2. Staleness pass.
//! 3. Phase-A stages (scale, remap) in configuration order.
//! 4. Merges in configuration order.
//! 5. Phase-B stages (PID, verified-output) in configuration order.
//! 6. Safety monitors.
//! 7. On-change dispatch for updated, subscribed signals.
//! 8. Cyclic scheduler.
//! 9. Clear updated flags, update stats.
//!
//! Stage and peripheral faults degrade the affected signal and the loop
//! continues. The only halts are init-time validation failure and a
//! terminal safety crosscheck failure, which drives the configured safe
//! outputs exactly once and stops ticking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use heapless::Vec as FixedVec;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use sigflow_common::config::{EngineConfig, LampState, MonitorSpec};
use sigflow_common::consts::{MAX_CYCLIC_JOBS, MAX_DTCS};
use sigflow_common::error::ConfigError;
use sigflow_common::platform::Platform;
use sigflow_common::signal::{SignalId, SignalStatus};

use crate::config as engine_config;
use crate::dtc::{DtcRecord, DtcRegistry};
use crate::merge::run_merge;
use crate::monitor::{CrosscheckMonitor, MonitorEvent};
use crate::output::{self, DeliveryResult, OutputSink, j1939};
use crate::pipeline::{StageState, run_stage};
use crate::ring::{IsrRing, RingError, RingProducer};
use crate::sched::{CyclicScheduler, DueJob};
use crate::store::{SignalStore, SlotFlags};

/// J1939 DM1 PGN (active diagnostic trouble codes).
const DM1_PGN: u16 = 65226;
/// Default J1939 priority for diagnostic and on-change traffic.
const DEFAULT_J1939_PRIORITY: u8 = 6;

// ─── Errors ─────────────────────────────────────────────────────────

/// Runtime errors that surface out of the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A safety crosscheck failed for longer than its window. The safe
    /// state has been driven; the engine accepts no further ticks.
    #[error("safety crosscheck {primary}/{secondary} failed; engine halted")]
    SafetyHalted {
        /// Primary channel signal.
        primary: SignalId,
        /// Secondary channel signal.
        secondary: SignalId,
    },
}

// ─── Stats ──────────────────────────────────────────────────────────

/// O(1) per-tick timing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct TickTiming {
    /// Last tick duration [ns].
    pub last_ns: i64,
    /// Minimum tick duration [ns].
    pub min_ns: i64,
    /// Maximum tick duration [ns].
    pub max_ns: i64,
    /// Running sum for average computation.
    pub sum_ns: i64,
    /// Ticks that exceeded the configured period.
    pub overruns: u64,
}

impl TickTiming {
    const fn new() -> Self {
        Self {
            last_ns: 0,
            min_ns: i64::MAX,
            max_ns: 0,
            sum_ns: 0,
            overruns: 0,
        }
    }

    #[inline]
    fn record(&mut self, duration_ns: i64, budget_ns: i64) {
        self.last_ns = duration_ns;
        if duration_ns < self.min_ns {
            self.min_ns = duration_ns;
        }
        if duration_ns > self.max_ns {
            self.max_ns = duration_ns;
        }
        self.sum_ns += duration_ns;
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average tick duration [ns].
    pub fn avg_ns(&self, ticks: u64) -> i64 {
        if ticks == 0 { 0 } else { self.sum_ns / ticks as i64 }
    }
}

/// Aggregated engine statistics. Snapshot via [`Engine::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Events drained from the ISR ring.
    pub events_drained: u64,
    /// Drained events with an out-of-range signal id (discarded).
    pub invalid_events: u64,
    /// Events dropped by producers on a full ring.
    pub ring_dropped: u64,
    /// Staleness transitions applied.
    pub stale_transitions: u64,
    /// Successful cyclic and on-change emissions.
    pub emissions: u64,
    /// Cyclic periods jumped while running late (not emitted).
    pub skipped_cycles: u64,
    /// Emissions deferred by a would-block sink.
    pub tx_would_block: u64,
    /// Emissions lost to peripheral faults.
    pub tx_failed: u64,
    /// Pipeline stage faults.
    pub stage_faults: u64,
    /// Merges with an empty contributing set.
    pub merge_starved: u64,
    /// Engine is halted after a safety failure.
    pub safety_halted: bool,
    /// Tick timing.
    pub timing: TickTiming,
}

impl EngineStats {
    const fn new() -> Self {
        Self {
            ticks: 0,
            events_drained: 0,
            invalid_events: 0,
            ring_dropped: 0,
            stale_transitions: 0,
            emissions: 0,
            skipped_cycles: 0,
            tx_would_block: 0,
            tx_failed: 0,
            stage_faults: 0,
            merge_starved: 0,
            safety_halted: false,
            timing: TickTiming::new(),
        }
    }
}

// ─── Stop Handle ────────────────────────────────────────────────────

/// Cloneable handle that asks a running engine to exit its loop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the engine loop to stop after the current tick.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// The runtime engine. Created by [`Engine::init`], driven by
/// [`Engine::tick`] or [`Engine::run`].
pub struct Engine<P: Platform> {
    platform: P,
    config: EngineConfig,
    ring: Arc<IsrRing>,
    store: SignalStore,
    stage_states: Box<[StageState]>,
    /// Indices into the stage table for each phase, configuration order.
    phase_a: Box<[usize]>,
    phase_b: Box<[usize]>,
    sched: CyclicScheduler,
    monitors: Box<[CrosscheckMonitor]>,
    dtc: DtcRegistry,
    custom_sink: Option<Box<dyn OutputSink>>,
    stop: Arc<AtomicBool>,
    /// Set on safety failure; refuses further ticks.
    halted: Option<(SignalId, SignalId)>,
    stats: EngineStats,
    tick_budget_ns: i64,
}

impl<P: Platform> Engine<P> {
    /// Validate the configuration tables, allocate all runtime state,
    /// and arm the cyclic deadlines at `now + phase_offset`.
    pub fn init(config: EngineConfig, platform: P) -> Result<Self, ConfigError> {
        engine_config::validate(&config)?;

        let mut store = SignalStore::new(config.engine.signal_count);
        for s in &config.staleness {
            store.configure_staleness(s.signal, s.stale_us, s.policy);
        }
        for o in &config.on_change {
            store.configure_on_change(o.signal);
        }

        let stage_states: Box<[StageState]> =
            config.stage.iter().map(StageState::for_spec).collect();
        let phase_a: Box<[usize]> = config
            .stage
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_phase_a())
            .map(|(i, _)| i)
            .collect();
        let phase_b: Box<[usize]> = config
            .stage
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_phase_a())
            .map(|(i, _)| i)
            .collect();

        let now = platform.now_us();
        let sched = CyclicScheduler::new(&config.cyclic, now);
        let monitors: Box<[CrosscheckMonitor]> = config
            .monitor
            .iter()
            .map(|m| CrosscheckMonitor::new(*m))
            .collect();
        let dtc = DtcRegistry::new(&config.dtc);
        let ring = Arc::new(IsrRing::with_capacity(config.engine.ring_capacity));
        let tick_budget_ns = i64::from(config.engine.tick_period_us) * 1_000;

        info!(
            signals = config.engine.signal_count,
            stages = config.stage.len(),
            merges = config.merge.len(),
            cyclic = config.cyclic.len(),
            monitors = config.monitor.len(),
            ring = config.engine.ring_capacity,
            "engine initialized"
        );

        Ok(Self {
            platform,
            config,
            ring,
            store,
            stage_states,
            phase_a,
            phase_b,
            sched,
            monitors,
            dtc,
            custom_sink: None,
            stop: Arc::new(AtomicBool::new(false)),
            halted: None,
            stats: EngineStats::new(),
            tick_budget_ns,
        })
    }

    /// Install the sink for output kinds the platform does not cover.
    pub fn set_output_sink(&mut self, sink: Box<dyn OutputSink>) {
        self.custom_sink = Some(sink);
    }

    /// Producer handle for ISR bindings.
    pub fn producer(&self) -> RingProducer {
        RingProducer::new(Arc::clone(&self.ring))
    }

    /// Handle that stops [`Engine::run`] from another context.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    /// Request the run loop to exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// ISR-safe event injection plus a wake of the engine thread.
    pub fn push_hw_event(
        &self,
        signal_id: SignalId,
        value: i32,
        timestamp_us: u64,
    ) -> Result<(), RingError> {
        let result = self.ring.push(sigflow_common::signal::HwEvent::new(
            signal_id,
            value,
            timestamp_us,
        ));
        self.platform.wake();
        result
    }

    /// Write a signal from user code between ticks.
    pub fn set_signal(&mut self, id: SignalId, value: i32) -> bool {
        if usize::from(id) >= self.store.len() {
            return false;
        }
        let now = self.platform.now_us();
        self.store.write_fresh(id, value, now);
        true
    }

    /// Read `(value, status, timestamp)` for one signal.
    pub fn get_signal(&self, id: SignalId) -> Option<(i32, SignalStatus, u64)> {
        self.store
            .try_slot(id)
            .map(|s| (s.value, s.status, s.timestamp_us))
    }

    /// Raise a DTC occurrence at the platform clock.
    pub fn raise_dtc(&mut self, spn: u32, fmi: u8) -> Option<DtcRecord> {
        let now = self.platform.now_us();
        self.dtc.raise(spn, fmi, now)
    }

    /// DTC registry access (enumerate, clear, snapshot/restore).
    pub fn dtc(&mut self) -> &mut DtcRegistry {
        &mut self.dtc
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> EngineStats {
        let mut stats = self.stats.clone();
        stats.ring_dropped = self.ring.dropped();
        stats
    }

    /// Platform access for callers that share it with HAL glue.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    // ─── Tick ───────────────────────────────────────────────────────

    /// Execute one tick at the given engine time.
    pub fn tick(&mut self, now_us: u64) -> Result<(), EngineError> {
        if let Some((primary, secondary)) = self.halted {
            return Err(EngineError::SafetyHalted { primary, secondary });
        }
        let started = Instant::now();

        self.drain(now_us);
        self.stats.stale_transitions += u64::from(self.store.staleness_pass(now_us));
        self.run_phase(true, now_us);
        self.run_merges(now_us);
        self.run_phase(false, now_us);

        if let Some(failed_idx) = self.evaluate_monitors(now_us) {
            let spec = *self.monitors[failed_idx].spec();
            self.enter_safe_state(&spec);
            return Err(EngineError::SafetyHalted {
                primary: spec.primary,
                secondary: spec.secondary,
            });
        }

        self.dispatch_on_change();
        self.run_cyclic(now_us);

        self.store.clear_updated();
        self.stats.ticks += 1;
        let duration_ns = started.elapsed().as_nanos().min(i64::MAX as u128) as i64;
        self.stats.timing.record(duration_ns, self.tick_budget_ns);
        Ok(())
    }

    /// Tick step 1: pop up to `drain_max` events into the store.
    fn drain(&mut self, _now_us: u64) {
        let ring = Arc::clone(&self.ring);
        let store = &mut self.store;
        let signal_count = self.config.engine.signal_count;
        let mut invalid = 0u64;

        let drained = ring.drain_into(self.config.engine.drain_max, |ev| {
            if ev.signal_id < signal_count {
                store.write_fresh(ev.signal_id, ev.value, ev.timestamp_us);
            } else {
                invalid += 1;
            }
        });
        self.stats.events_drained += drained as u64;
        if invalid > 0 {
            warn!(invalid, "discarded events with out-of-range signal ids");
            self.stats.invalid_events += invalid;
        }
    }

    /// Tick steps 3 and 5: run one phase of the stage table.
    fn run_phase(&mut self, phase_a: bool, now_us: u64) {
        let indices = if phase_a { &self.phase_a } else { &self.phase_b };
        for &idx in indices.iter() {
            let spec = &self.config.stage[idx];
            let result = run_stage(spec, &mut self.stage_states[idx], &mut self.store, now_us);
            if result.fault {
                self.stats.stage_faults += 1;
                warn!(output = spec.output(), "stage fault");
            }
        }
    }

    /// Tick step 4: run every merge in configuration order.
    fn run_merges(&mut self, now_us: u64) {
        for spec in &self.config.merge {
            let outcome = run_merge(spec, &self.store, now_us);
            match outcome.value {
                Some(value) => {
                    self.store
                        .write_with_status(spec.output, value, outcome.status, now_us);
                }
                None => {
                    // No contributor: value unchanged, status Error.
                    self.store.degrade(spec.output, SignalStatus::Error);
                    self.stats.merge_starved += 1;
                    debug!(output = spec.output, "merge has no contributing input");
                }
            }
        }
    }

    /// Tick step 6. Returns the index of a monitor that failed this tick.
    fn evaluate_monitors(&mut self, now_us: u64) -> Option<usize> {
        let mut failed = None;
        for (i, monitor) in self.monitors.iter_mut().enumerate() {
            let spec = *monitor.spec();
            let primary = *self.store.slot(spec.primary);
            let secondary = *self.store.slot(spec.secondary);
            match monitor.evaluate(&primary, &secondary, now_us) {
                MonitorEvent::None => {}
                MonitorEvent::EnteredSuspect => warn!(
                    primary = spec.primary,
                    secondary = spec.secondary,
                    "crosscheck disagreement"
                ),
                MonitorEvent::Recovered => info!(
                    primary = spec.primary,
                    secondary = spec.secondary,
                    "crosscheck recovered"
                ),
                MonitorEvent::Failed => {
                    failed = Some(i);
                    break;
                }
            }
        }
        failed
    }

    /// Drive the configured safe state exactly once and halt.
    fn enter_safe_state(&mut self, spec: &MonitorSpec) {
        error!(
            primary = spec.primary,
            secondary = spec.secondary,
            "sustained crosscheck failure; entering safe state"
        );
        let bus = self.config.engine.can_bus;
        let sa = self.config.engine.source_address;

        // Designated safe-state line, asserted once.
        if let Some(pin) = spec.safe_gpio {
            if let Err(e) = self.platform.gpio_set(pin, true) {
                error!(pin, error = %e, "safe-state GPIO assertion failed");
            }
        }

        // Drive every configured safe output value.
        for so in &self.config.safe_output {
            let result = output::deliver(
                &mut self.platform,
                self.custom_sink.as_deref_mut(),
                bus,
                sa,
                so.kind,
                so.target,
                DEFAULT_J1939_PRIORITY,
                so.value,
                2,
            );
            if result != DeliveryResult::Sent {
                error!(target = so.target, "safe output delivery failed");
            }
        }

        // DM1 with the critical lamp; one frame's worth of records.
        let mut records: FixedVec<DtcRecord, MAX_DTCS> = FixedVec::new();
        for r in self.dtc.iter_active() {
            let _ = records.push(r);
        }
        let dm1 = j1939::encode_dm1(LampState::Red, records.iter());
        let frame_len = dm1.len().min(8);
        let id = j1939::can_id(DEFAULT_J1939_PRIORITY, 0, DM1_PGN, sa);
        if let Err(e) = self.platform.can_send(bus, id, true, &dm1[..frame_len]) {
            error!(error = %e, "DM1 emission failed");
        }

        self.halted = Some((spec.primary, spec.secondary));
        self.stats.safety_halted = true;
    }

    /// Tick step 7: emit every updated signal with a subscription.
    fn dispatch_on_change(&mut self) {
        let bus = self.config.engine.can_bus;
        let sa = self.config.engine.source_address;
        for spec in &self.config.on_change {
            let slot = self.store.slot(spec.signal);
            if !slot.flags.contains(SlotFlags::UPDATED) {
                continue;
            }
            let result = output::deliver(
                &mut self.platform,
                self.custom_sink.as_deref_mut(),
                bus,
                sa,
                spec.kind,
                spec.target,
                DEFAULT_J1939_PRIORITY,
                slot.value,
                spec.length,
            );
            match result {
                DeliveryResult::Sent => self.stats.emissions += 1,
                // On-change emissions are not retried; the next change
                // will publish a fresher value anyway.
                DeliveryResult::WouldBlock => self.stats.tx_would_block += 1,
                DeliveryResult::Failed => self.stats.tx_failed += 1,
            }
        }
    }

    /// Tick step 8: cyclic scheduler.
    fn run_cyclic(&mut self, now_us: u64) {
        let bus = self.config.engine.can_bus;
        let sa = self.config.engine.source_address;
        let mut due: FixedVec<DueJob, MAX_CYCLIC_JOBS> = FixedVec::new();
        self.sched.collect_due(now_us, &mut due);

        for job in due {
            let spec = self.config.cyclic[usize::from(job.index)];
            let value = self.store.slot(spec.source).value;
            let result = output::deliver(
                &mut self.platform,
                self.custom_sink.as_deref_mut(),
                bus,
                sa,
                spec.kind,
                spec.target,
                spec.priority,
                value,
                spec.length,
            );
            let delivered = match result {
                DeliveryResult::Sent => {
                    self.stats.emissions += 1;
                    true
                }
                DeliveryResult::WouldBlock => {
                    self.stats.tx_would_block += 1;
                    false
                }
                DeliveryResult::Failed => {
                    self.stats.tx_failed += 1;
                    self.store.degrade(spec.source, SignalStatus::Error);
                    warn!(source = spec.source, target = spec.target, "cyclic emission failed");
                    true
                }
            };
            let jumped = self.sched.rearm(job, now_us, delivered);
            self.stats.skipped_cycles += u64::from(jumped);
        }
    }

    // ─── Run Loop ───────────────────────────────────────────────────

    /// Loop `tick` + sleep-until-next-deadline until [`Engine::stop`].
    ///
    /// Suspends only at tick boundaries; an ISR `wake` pulls the thread
    /// out of its sleep early so freshly pushed events are drained.
    pub fn run(&mut self) -> Result<(), EngineError> {
        info!(
            period_us = self.config.engine.tick_period_us,
            "engine loop starting"
        );
        while !self.stop.load(Ordering::Acquire) {
            let now = self.platform.now_us();
            self.tick(now)?;

            let next_tick = now + u64::from(self.config.engine.tick_period_us);
            let next = match self.sched.next_deadline() {
                Some(deadline) => next_tick.min(deadline.max(now)),
                None => next_tick,
            };
            let after = self.platform.now_us();
            if next > after {
                self.platform.sleep_us((next - after).min(u64::from(u32::MAX)) as u32);
            }
        }
        info!("engine loop stopped");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
