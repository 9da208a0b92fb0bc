//! Native host platform (development and HIL rigs).
//!
//! Monotonic time comes from `std::time::Instant` anchored at
//! construction. Sleeps park on a condvar so an ISR-context `wake`
//! (any other thread) can cut them short. Peripheral outputs are
//! logged; inputs are unsupported on a bare host, where HIL rigs feed
//! the engine through the ring producer instead.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use sigflow_common::platform::{Platform, PlatformError, PlatformResult};

/// Host-backed platform implementation.
pub struct NativePlatform {
    epoch: Instant,
    wake: Arc<(Mutex<bool>, Condvar)>,
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePlatform {
    /// Anchor the monotonic clock at construction.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            wake: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Cloneable wake handle for producer threads.
    pub fn waker(&self) -> NativeWaker {
        NativeWaker {
            wake: Arc::clone(&self.wake),
        }
    }

    /// Clock handle sharing this platform's epoch, for producer threads
    /// that must timestamp events on the engine clock.
    pub fn clock(&self) -> NativeClock {
        NativeClock { epoch: self.epoch }
    }

    fn interruptible_sleep(&self, duration: Duration) {
        let (lock, condvar) = &*self.wake;
        let deadline = Instant::now() + duration;
        let mut woken = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*woken {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _timeout) = condvar
                .wait_timeout(woken, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            woken = guard;
        }
        *woken = false;
    }
}

impl Platform for NativePlatform {
    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros().min(u128::from(u64::MAX)) as u64
    }

    fn sleep_ms(&self, ms: u32) {
        self.interruptible_sleep(Duration::from_millis(u64::from(ms)));
    }

    fn sleep_us(&self, us: u32) {
        self.interruptible_sleep(Duration::from_micros(u64::from(us)));
    }

    fn wake(&self) {
        let (lock, condvar) = &*self.wake;
        let mut woken = lock.lock().unwrap_or_else(|e| e.into_inner());
        *woken = true;
        condvar.notify_one();
    }

    fn adc_read(&mut self, _channel: u8) -> PlatformResult<i32> {
        Err(PlatformError::Unsupported("adc"))
    }

    fn spi_transfer(&mut self, _bus: u8, _tx: &[u8], _rx: &mut [u8]) -> PlatformResult<()> {
        Err(PlatformError::Unsupported("spi"))
    }

    fn can_send(&mut self, bus: u8, id: u32, extended: bool, data: &[u8]) -> PlatformResult<()> {
        debug!(bus, id, extended, ?data, "can tx");
        Ok(())
    }

    fn gpio_set(&mut self, pin: u32, state: bool) -> PlatformResult<()> {
        debug!(pin, state, "gpio set");
        Ok(())
    }

    fn pwm_set(&mut self, channel: u32, duty_q: u16) -> PlatformResult<()> {
        debug!(channel, duty_q, "pwm set");
        Ok(())
    }

    fn dac_write(&mut self, channel: u32, value: u16) -> PlatformResult<()> {
        debug!(channel, value, "dac write");
        Ok(())
    }
}

/// Monotonic clock sharing a [`NativePlatform`]'s epoch.
#[derive(Debug, Clone, Copy)]
pub struct NativeClock {
    epoch: Instant,
}

impl NativeClock {
    /// Microseconds since the platform epoch.
    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros().min(u128::from(u64::MAX)) as u64
    }
}

/// Wake handle usable from producer threads that do not own the
/// platform value.
#[derive(Clone)]
pub struct NativeWaker {
    wake: Arc<(Mutex<bool>, Condvar)>,
}

impl NativeWaker {
    /// Pull the engine thread out of its sleep.
    pub fn wake(&self) {
        let (lock, condvar) = &*self.wake;
        let mut woken = lock.lock().unwrap_or_else(|e| e.into_inner());
        *woken = true;
        condvar.notify_one();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
