//! Tick ordering, dispatch, and degradation behavior.

use std::io::Write;

use sigflow_common::signal::SignalStatus;
use sigflow_engine::Engine;
use sigflow_engine::config::{load_config, load_config_from_str};
use sigflow_hal::sim::SimPlatform;

fn engine_from(toml_src: &str) -> Engine<SimPlatform> {
    let config = load_config_from_str(toml_src).expect("config");
    Engine::init(config, SimPlatform::new()).expect("init")
}

#[test]
fn pid_sees_merged_values_not_raw_ones() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 8

        [[merge]]
        output = 2
        inputs = [0, 1]
        method = "average"
        tolerance = 1000

        [[stage]]
        type = "pid"
        setpoint = 3
        measurement = 2
        output = 4
        kp_m = 1000
        ki_m = 0
        kd_m = 0
        out_min = -10000
        out_max = 10000
        integral_min = 0
        integral_max = 0
        sample_time_us = 1000
    "#,
    );

    engine.set_signal(0, 100);
    engine.set_signal(1, 200);
    engine.set_signal(3, 250);
    engine.tick(1_000).unwrap();

    // The merge (step 4) wrote 150 before the PID (step 5) ran, so the
    // proportional error is 250 - 150, not 250 - 0.
    assert_eq!(engine.get_signal(2).unwrap().0, 150);
    assert_eq!(engine.get_signal(4).unwrap().0, 100);
}

#[test]
fn scaled_values_feed_merges_in_the_same_tick() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 8

        [[stage]]
        type = "scale"
        input = 0
        output = 1
        scale_q = 2000
        offset = 0

        [[merge]]
        output = 3
        inputs = [1, 2]
        method = "max"
        tolerance = 100000
    "#,
    );

    engine.set_signal(0, 50);
    engine.set_signal(2, 10);
    engine.tick(1_000).unwrap();

    // Phase A doubled signal 0 into signal 1 before the merge ran.
    assert_eq!(engine.get_signal(3).unwrap().0, 100);
}

#[test]
fn on_change_emits_only_on_updates() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[on_change]]
        signal = 1
        kind = "can"
        target = 291
        length = 2
    "#,
    );

    engine.set_signal(1, 0x0102);
    engine.tick(1_000).unwrap();
    {
        let frames = engine.platform_mut().can_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 291);
        assert!(!frames[0].extended);
        assert_eq!(frames[0].payload(), &[0x02, 0x01]);
    }

    // No update this tick: no emission.
    engine.tick(2_000).unwrap();
    assert_eq!(engine.platform_mut().can_frames().len(), 1);

    // A fresh hardware event republishes.
    engine.push_hw_event(1, 7, 2_500).unwrap();
    engine.tick(3_000).unwrap();
    assert_eq!(engine.platform_mut().can_frames().len(), 2);
}

#[test]
fn would_block_sink_retries_without_phase_shift() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[cyclic]]
        source = 0
        kind = "can"
        target = 256
        period_us = 100000
    "#,
    );
    engine.set_signal(0, 1);
    engine.platform_mut().inject_can_would_block(1);

    // Deadline 0 hits a full TX queue: deferred, not dropped.
    engine.tick(0).unwrap();
    assert_eq!(engine.platform_mut().can_frames().len(), 0);
    assert_eq!(engine.stats().tx_would_block, 1);

    // Retry on the next tick succeeds; the period grid is preserved so
    // the 100 ms deadline still fires on time.
    engine.tick(10_000).unwrap();
    assert_eq!(engine.platform_mut().can_frames().len(), 1);
    engine.tick(100_000).unwrap();
    assert_eq!(engine.platform_mut().can_frames().len(), 2);
    assert_eq!(engine.stats().skipped_cycles, 0);
}

#[test]
fn failed_sink_degrades_source_signal() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[cyclic]]
        source = 0
        kind = "can"
        target = 256
        period_us = 100000
    "#,
    );
    engine.set_signal(0, 1);
    engine.platform_mut().set_can_bus_off(true);

    engine.tick(0).unwrap();
    assert_eq!(engine.stats().tx_failed, 1);
    assert_eq!(engine.get_signal(0).unwrap().1, SignalStatus::Error);
}

#[test]
fn staleness_degrades_between_ticks() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[staleness]]
        signal = 0
        stale_us = 10000
        policy = "timeout"
    "#,
    );

    engine.push_hw_event(0, 42, 0).unwrap();
    engine.tick(5_000).unwrap();
    assert_eq!(engine.get_signal(0).unwrap().1, SignalStatus::Ok);

    engine.tick(20_000).unwrap();
    let (value, status, _) = engine.get_signal(0).unwrap();
    assert_eq!(status, SignalStatus::Timeout);
    // The value is untouched.
    assert_eq!(value, 42);
}

#[test]
fn starved_merge_keeps_last_value_with_error_status() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[merge]]
        output = 3
        inputs = [0, 1]
        method = "average"
        tolerance = 100
        stale_us = 10000
    "#,
    );

    engine.push_hw_event(0, 100, 500).unwrap();
    engine.push_hw_event(1, 200, 500).unwrap();
    engine.tick(1_000).unwrap();
    assert_eq!(engine.get_signal(3).unwrap().0, 150);

    // Both inputs age out of the merge window: the fused value holds,
    // the status says it cannot be trusted.
    engine.tick(100_000).unwrap();
    let (value, status, _) = engine.get_signal(3).unwrap();
    assert_eq!(value, 150);
    assert_eq!(status, SignalStatus::Error);
    assert_eq!(engine.stats().merge_starved, 1);
}

#[test]
fn dtc_lifecycle_through_engine_api() {
    let mut engine = engine_from(
        r#"
        [engine]
        signal_count = 4

        [[dtc]]
        spn = 520192
        fmi = 3
        lamp = "amber"
        confirm_count = 2
    "#,
    );

    // The configured definition occupies its pool slot from init.
    assert_eq!(engine.dtc().len(), 1);
    assert_eq!(engine.dtc().iter_active().count(), 0);

    let first = engine.raise_dtc(520_192, 3).unwrap();
    assert_eq!(first.occurrence_count, 1);
    assert_eq!(engine.dtc().iter_active().count(), 0);

    let second = engine.raise_dtc(520_192, 3).unwrap();
    assert_eq!(second.occurrence_count, 2);
    assert_eq!(engine.dtc().iter_active().count(), 1);

    // Clear returns the definition to Inactive with zeroed history.
    engine.dtc().clear();
    assert_eq!(engine.dtc().len(), 1);
    assert_eq!(engine.dtc().iter_active().count(), 0);
    let cleared = engine.dtc().get(520_192, 3).unwrap();
    assert_eq!(cleared.occurrence_count, 0);
}

#[test]
fn run_loop_stops_on_handle() {
    use sigflow_hal::NativePlatform;
    use std::time::Duration;

    let config = load_config_from_str(
        r#"
        [engine]
        signal_count = 4
        tick_period_us = 1000
    "#,
    )
    .expect("config");
    let mut engine = Engine::init(config, NativePlatform::new()).expect("init");

    let stop = engine.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        stop.stop();
    });

    engine.run().expect("run");
    stopper.join().unwrap();
    assert!(engine.stats().ticks >= 1);
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
        [engine]
        signal_count = 4

        [[stage]]
        type = "remap"
        input = 0
        output = 1
        points = [[0, 0], [100, 1000]]
    "#
    )
    .expect("write");

    let config = load_config(file.path()).expect("load");
    assert_eq!(config.stage.len(), 1);

    let mut engine = Engine::init(config, SimPlatform::new()).expect("init");
    engine.set_signal(0, 50);
    engine.tick(1_000).unwrap();
    assert_eq!(engine.get_signal(1).unwrap().0, 500);
}
