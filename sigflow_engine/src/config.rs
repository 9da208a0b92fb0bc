//! Configuration loading and cross-table validation.
//!
//! Field-level bounds live on the table types in `sigflow_common`; this
//! module adds the rules that need every table at once: dense id
//! ranges, one writer per output signal, and pool capacities. All
//! failures are fatal at init.

use std::collections::HashSet;
use std::path::Path;

use sigflow_common::config::EngineConfig;
use sigflow_common::consts::{MAX_CYCLIC_JOBS, MAX_DTCS, MAX_MONITORS};
use sigflow_common::error::ConfigError;
use sigflow_common::signal::SignalId;

/// Load and validate a generator artifact from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let toml_src = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
    load_config_from_str(&toml_src)
}

/// Load and validate a generator artifact from a TOML string (tests and
/// embedded artifacts).
pub fn load_config_from_str(toml_src: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig =
        toml::from_str(toml_src).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Cross-table validation over an already field-validated config.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    config
        .validate_fields()
        .map_err(ConfigError::Validation)?;

    let count = config.engine.signal_count;
    let check = |id: SignalId, what: &str| -> Result<(), ConfigError> {
        if id >= count {
            return Err(ConfigError::Validation(format!(
                "{what}: signal {id} out of range [0, {count})"
            )));
        }
        Ok(())
    };

    // Id ranges across every table.
    for s in &config.staleness {
        check(s.signal, "staleness")?;
    }
    for st in &config.stage {
        check(st.output(), "stage output")?;
        for input in st.inputs() {
            check(input, "stage input")?;
        }
    }
    for m in &config.merge {
        check(m.output, "merge output")?;
        for &input in &m.inputs {
            check(input, "merge input")?;
        }
    }
    for j in &config.cyclic {
        check(j.source, "cyclic source")?;
    }
    for o in &config.on_change {
        check(o.signal, "on_change signal")?;
    }
    for m in &config.monitor {
        check(m.primary, "monitor primary")?;
        check(m.secondary, "monitor secondary")?;
    }

    // One writer per output signal across stages and merges.
    let mut writers: HashSet<SignalId> = HashSet::new();
    for st in &config.stage {
        if !writers.insert(st.output()) {
            return Err(ConfigError::Validation(format!(
                "duplicate writer for signal {}",
                st.output()
            )));
        }
    }
    for m in &config.merge {
        if !writers.insert(m.output) {
            return Err(ConfigError::Validation(format!(
                "duplicate writer for signal {}",
                m.output
            )));
        }
    }

    // Pool capacities.
    if config.cyclic.len() > MAX_CYCLIC_JOBS {
        return Err(ConfigError::Validation(format!(
            "{} cyclic jobs exceeds capacity {MAX_CYCLIC_JOBS}",
            config.cyclic.len()
        )));
    }
    if config.monitor.len() > MAX_MONITORS {
        return Err(ConfigError::Validation(format!(
            "{} monitors exceeds capacity {MAX_MONITORS}",
            config.monitor.len()
        )));
    }
    if config.dtc.len() > MAX_DTCS {
        return Err(ConfigError::Validation(format!(
            "{} DTC definitions exceeds pool capacity {MAX_DTCS}",
            config.dtc.len()
        )));
    }

    // Duplicate staleness rows would make the winning threshold
    // ordering-dependent.
    let mut stale_ids: HashSet<SignalId> = HashSet::new();
    for s in &config.staleness {
        if !stale_ids.insert(s.signal) {
            return Err(ConfigError::Validation(format!(
                "duplicate staleness entry for signal {}",
                s.signal
            )));
        }
    }

    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
