//! Init-time error taxonomy.
//!
//! Runtime faults (I/O, staleness, tolerance, ring overflow) never leave
//! the engine as errors; they are absorbed into signal status fields and
//! stats counters. Only configuration problems and sustained safety
//! failures surface to the caller.

use thiserror::Error;

/// Configuration loading/validation error. Fatal; `init` fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),

    /// Field bounds or cross-table validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Tests ──────────────────────────────────────────────────────────
