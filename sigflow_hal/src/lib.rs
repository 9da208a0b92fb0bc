//! # Sigflow HAL
//!
//! Platform implementations consumed by the engine. One backend per
//! target, selected at build time:
//!
//! - [`native`] - Host/HIL backend over std clocks and sleeps
//! - [`sim`] - Simulation backend with scripted inputs and recorded
//!   outputs (the hardware-in-the-loop test double)
//! - [`bindings`] - `(peripheral, channel) → signal` poll table that
//!   replaces macro-generated ISR handlers

pub mod bindings;
pub mod native;
pub mod sim;

pub use bindings::{BindingTable, IsrBinding, PollSource};
pub use native::NativePlatform;
pub use sim::{CanFrame, SimPlatform};
