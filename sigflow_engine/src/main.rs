//! # Sigflow Engine demo binary
//!
//! Runs the engine on the native platform with a simulated sensor feed:
//! a producer thread pushes a triangle wave onto signal 0, the engine
//! scales it to per-mille and broadcasts it as a cyclic J1939 frame.
//! CAN traffic is visible at `RUST_LOG=debug`.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use sigflow_engine::Engine;
use sigflow_engine::config::{load_config, load_config_from_str};
use sigflow_engine::rt::{RtConfig, rt_setup};
use sigflow_hal::NativePlatform;

/// Demo configuration used when no artifact is given: ADC-style raw
/// input on signal 0, per-mille scale to signal 1, 100 ms J1939
/// broadcast of the scaled value.
const DEMO_CONFIG: &str = r#"
    [engine]
    signal_count = 4
    tick_period_us = 10000

    [[staleness]]
    signal = 0
    stale_us = 500000

    [[stage]]
    type = "scale"
    input = 0
    output = 1
    in_min = 0
    in_max = 1023
    out_min = 0
    out_max = 1000

    [[cyclic]]
    source = 1
    kind = "j1939"
    target = 61444
    period_us = 100000
    priority = 3
    length = 2
"#;

#[derive(Debug, Parser)]
#[command(name = "sigflow_engine", about = "Sigflow signal-processing engine")]
struct Args {
    /// Path to a generator artifact (TOML). Defaults to the built-in
    /// demo configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to run before stopping [s].
    #[arg(long, default_value_t = 5)]
    duration_secs: u64,

    /// Feed period for the simulated sensor [ms].
    #[arg(long, default_value_t = 10)]
    feed_ms: u64,

    /// Dump final statistics as JSON on stdout.
    #[arg(long)]
    stats_json: bool,

    /// Apply the PREEMPT_RT setup sequence before the loop.
    #[arg(long)]
    rt: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => load_config_from_str(DEMO_CONFIG).expect("built-in demo config is valid"),
    };

    if args.rt {
        if let Err(e) = rt_setup(RtConfig::default()) {
            error!(error = %e, "RT setup failed");
            std::process::exit(1);
        }
    }

    let platform = NativePlatform::new();
    let clock = platform.clock();
    let waker = platform.waker();

    let mut engine = match Engine::init(config, platform) {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "engine init failed");
            std::process::exit(1);
        }
    };

    // Simulated sensor: triangle wave over the 10-bit ADC range.
    let producer = engine.producer();
    let feed_ms = args.feed_ms.max(1);
    let feeder = thread::spawn(move || {
        let mut value: i32 = 0;
        let mut rising = true;
        loop {
            if producer.push(0, value, clock.now_us()).is_err() {
                // Ring full: the drop is counted, keep feeding.
            }
            waker.wake();
            if rising {
                value += 16;
                if value >= 1023 {
                    rising = false;
                }
            } else {
                value -= 16;
                if value <= 0 {
                    rising = true;
                }
            }
            thread::sleep(Duration::from_millis(feed_ms));
        }
    });

    // Timed stop.
    let stop = engine.stop_handle();
    let duration = Duration::from_secs(args.duration_secs);
    thread::spawn(move || {
        thread::sleep(duration);
        stop.stop();
    });

    info!(secs = args.duration_secs, "running");
    match engine.run() {
        Ok(()) => info!("engine stopped"),
        Err(e) => error!(error = %e, "engine halted"),
    }

    let stats = engine.stats();
    if args.stats_json {
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "stats serialization failed"),
        }
    } else {
        info!(
            ticks = stats.ticks,
            drained = stats.events_drained,
            dropped = stats.ring_dropped,
            emissions = stats.emissions,
            skipped = stats.skipped_cycles,
            avg_tick_ns = stats.timing.avg_ns(stats.ticks),
            "final statistics"
        );
    }

    // The feeder is detached; the process exit reaps it.
    drop(feeder);
}
