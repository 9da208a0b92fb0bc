//! `(peripheral, channel) → signal` poll table.
//!
//! The offline generator emits a binding list alongside the engine
//! tables; the HAL realizes it by polling the bound inputs and pushing
//! hardware events through the engine's ring producer. On interrupt-
//! capable targets the same table seeds real ISR handlers; on polled
//! targets a driver thread walks it at sample rate.
//!
//! A failed peripheral read pushes nothing; the bound signal then goes
//! stale and the engine's staleness pass degrades it.

use tracing::warn;

use sigflow_common::platform::Platform;
use sigflow_common::signal::SignalId;

/// Input source a binding polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSource {
    /// One ADC conversion per poll.
    Adc {
        /// ADC channel.
        channel: u8,
    },
    /// SPI register read: one address byte out, a little-endian i16 in.
    SpiReg {
        /// SPI bus.
        bus: u8,
        /// Register address byte.
        reg: u8,
    },
}

/// One `(peripheral, channel) → signal` binding.
#[derive(Debug, Clone, Copy)]
pub struct IsrBinding {
    /// Polled input.
    pub source: PollSource,
    /// Target signal id.
    pub signal: SignalId,
}

/// Immutable binding list, walked once per sample period.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: Vec<IsrBinding>,
}

impl BindingTable {
    /// Build from the generator's binding list.
    pub fn new(bindings: Vec<IsrBinding>) -> Self {
        Self { bindings }
    }

    /// Bound entries.
    pub fn bindings(&self) -> &[IsrBinding] {
        &self.bindings
    }

    /// Poll every binding once, pushing `(signal, value, timestamp)`
    /// for each successful read. Returns the number of events pushed.
    pub fn poll<P: Platform>(
        &self,
        platform: &mut P,
        mut push: impl FnMut(SignalId, i32, u64),
    ) -> usize {
        let mut pushed = 0;
        for binding in &self.bindings {
            let value = match binding.source {
                PollSource::Adc { channel } => match platform.adc_read(channel) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(signal = binding.signal, channel, error = %e, "adc poll failed");
                        continue;
                    }
                },
                PollSource::SpiReg { bus, reg } => {
                    let tx = [reg, 0, 0];
                    let mut rx = [0u8; 3];
                    match platform.spi_transfer(bus, &tx, &mut rx) {
                        Ok(()) => i32::from(i16::from_le_bytes([rx[1], rx[2]])),
                        Err(e) => {
                            warn!(signal = binding.signal, bus, reg, error = %e, "spi poll failed");
                            continue;
                        }
                    }
                }
            };
            let now = platform.now_us();
            push(binding.signal, value, now);
            pushed += 1;
        }
        pushed
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
