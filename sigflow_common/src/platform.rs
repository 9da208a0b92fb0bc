//! Platform capability trait consumed by the engine.
//!
//! One implementation per target (native/HIL, simulation, MCU shims).
//! Selection is at build time; the engine is generic over the trait and
//! never takes a lock an ISR could wait on.
//!
//! # Contract
//!
//! - `now_us()` is monotonic: each call returns a value >= the previous.
//! - `wake()` is ISR-safe and pulls the engine thread out of its sleep.
//! - All peripheral entry points are non-blocking. A sink that cannot
//!   accept a payload right now returns [`PlatformError::WouldBlock`];
//!   the cyclic scheduler retries on the next tick.

use thiserror::Error;

/// Error type for platform peripheral operations.
///
/// Any non-success is treated by the engine as a producer/consumer fault:
/// the affected signal degrades to `Error`, the engine continues.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The peripheral cannot accept the request right now (full TX queue).
    /// The caller retries on the next tick.
    #[error("would block: {0}")]
    WouldBlock(&'static str),

    /// Peripheral I/O failure (ADC timeout, CAN bus-off, SPI framing).
    #[error("{peripheral} I/O error: {detail}")]
    Io {
        /// Peripheral name ("adc", "can", "spi", ...).
        peripheral: &'static str,
        /// Human-readable failure detail.
        detail: String,
    },

    /// The platform does not implement this peripheral.
    #[error("unsupported peripheral: {0}")]
    Unsupported(&'static str),
}

/// Result alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Monotonic clock, sleep, wake, and peripheral entry points.
///
/// The engine owns the platform value and calls it only from the tick
/// thread; `now_us` and `wake` must additionally be safe from ISR
/// context (producers timestamp their own events).
pub trait Platform {
    /// Monotonic time [µs]. Must never decrease.
    fn now_us(&self) -> u64;

    /// Sleep for the given number of milliseconds.
    fn sleep_ms(&self, ms: u32);

    /// Sleep for the given number of microseconds.
    fn sleep_us(&self, us: u32);

    /// ISR-safe wake: interrupt an in-progress `sleep_*` on the engine
    /// thread so freshly pushed events are drained promptly.
    ///
    /// Default is a no-op for platforms whose sleeps are short enough
    /// that wake latency does not matter.
    fn wake(&self) {}

    /// Read one ADC channel. Returns the raw conversion result.
    fn adc_read(&mut self, channel: u8) -> PlatformResult<i32>;

    /// Full-duplex SPI transfer on the given bus.
    ///
    /// `rx` must be at least as long as `tx`.
    fn spi_transfer(&mut self, bus: u8, tx: &[u8], rx: &mut [u8]) -> PlatformResult<()>;

    /// Queue one CAN frame (up to 8 data bytes) for transmission.
    fn can_send(&mut self, bus: u8, id: u32, extended: bool, data: &[u8]) -> PlatformResult<()>;

    /// Drive a GPIO pin.
    fn gpio_set(&mut self, pin: u32, state: bool) -> PlatformResult<()>;

    /// Set a PWM channel duty cycle [0..=10000 = 0..100.00%].
    fn pwm_set(&mut self, channel: u32, duty_q: u16) -> PlatformResult<()>;

    /// Write a raw DAC code.
    fn dac_write(&mut self, channel: u32, value: u16) -> PlatformResult<()>;
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_display() {
        let e = PlatformError::Io {
            peripheral: "can",
            detail: "bus-off".into(),
        };
        assert!(e.to_string().contains("can"));
        assert!(e.to_string().contains("bus-off"));

        let e = PlatformError::WouldBlock("can tx queue");
        assert!(e.to_string().contains("would block"));
    }
}
