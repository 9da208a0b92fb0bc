//! Common re-exports for downstream crates.

pub use crate::config::{
    CyclicJobSpec, DtcSpec, EngineConfig, EngineSettings, LampState, MergeSpec, MonitorSpec,
    OnChangeSpec, OutputKind, PidSpec, PipelineStageSpec, QuorumPolicy, RemapSpec, SafeOutputSpec,
    ScaleMode, ScaleSpec, StalenessSpec, VerifySpec, VoteMethod,
};
pub use crate::error::ConfigError;
pub use crate::platform::{Platform, PlatformError, PlatformResult};
pub use crate::signal::{HwEvent, SignalId, SignalStatus, StalePolicy};
