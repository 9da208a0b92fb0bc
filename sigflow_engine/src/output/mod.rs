//! Output payload formatting and delivery routing.
//!
//! The engine treats every emission as an opaque little-endian payload
//! plus a kind-specific target id. CAN-family kinds route through the
//! platform's `can_send`; GPIO/PWM/DAC drive their peripherals
//! directly; the remaining kinds (UART, SPI, I2C, Modbus) go through a
//! pluggable [`OutputSink`].
//!
//! A would-block sink is not an error: the scheduler retries the job on
//! the next tick and counts the miss.

pub mod j1939;

use sigflow_common::config::OutputKind;
use sigflow_common::platform::{Platform, PlatformError, PlatformResult};

/// Formatted emission payload (fits one CAN data field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    /// Payload bytes; only `len` are valid.
    pub bytes: [u8; 8],
    /// Valid byte count (1..=8).
    pub len: u8,
}

impl Payload {
    /// Valid bytes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

/// Encode a signal value little-endian into the first `length` bytes.
pub fn format_value(value: i32, length: u8) -> Payload {
    let le = i64::from(value).to_le_bytes();
    let mut bytes = [0u8; 8];
    let len = length.clamp(1, 8);
    bytes[..usize::from(len)].copy_from_slice(&le[..usize::from(len)]);
    Payload { bytes, len }
}

/// Delivery outcome of one emission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Queued/driven successfully.
    Sent,
    /// Sink cannot accept right now; retry next tick.
    WouldBlock,
    /// Peripheral fault or unsupported kind; the emission is lost.
    Failed,
}

/// Pluggable sink for output kinds the platform trait does not cover.
pub trait OutputSink {
    /// Deliver one payload.
    fn deliver(&mut self, kind: OutputKind, target: u32, payload: &Payload) -> PlatformResult<()>;
}

fn map_result(result: PlatformResult<()>) -> DeliveryResult {
    match result {
        Ok(()) => DeliveryResult::Sent,
        Err(PlatformError::WouldBlock(_)) => DeliveryResult::WouldBlock,
        Err(_) => DeliveryResult::Failed,
    }
}

/// Route one emission to its sink.
///
/// `priority` feeds the J1939 identifier assembly; other kinds ignore
/// it. `source_address` and `bus` come from the engine settings.
#[allow(clippy::too_many_arguments)]
pub fn deliver<'a, P: Platform>(
    platform: &mut P,
    custom_sink: Option<&mut (dyn OutputSink + 'a)>,
    bus: u8,
    source_address: u8,
    kind: OutputKind,
    target: u32,
    priority: u8,
    value: i32,
    length: u8,
) -> DeliveryResult {
    match kind {
        OutputKind::Can => {
            let payload = format_value(value, length);
            let extended = target > 0x7FF;
            map_result(platform.can_send(bus, target, extended, payload.as_slice()))
        }
        OutputKind::J1939 => {
            let payload = format_value(value, length);
            let pgn = (target & 0xFFFF) as u16;
            let data_page = ((target >> 16) & 0x01) as u8;
            let id = j1939::can_id(priority, data_page, pgn, source_address);
            map_result(platform.can_send(bus, id, true, payload.as_slice()))
        }
        OutputKind::CanOpen => {
            // COB-ID addressed PDO; the payload layout was fixed by the
            // generator's PDO map.
            let payload = format_value(value, length);
            let extended = target > 0x7FF;
            map_result(platform.can_send(bus, target, extended, payload.as_slice()))
        }
        OutputKind::Gpio => map_result(platform.gpio_set(target, value != 0)),
        OutputKind::Pwm => {
            let duty = value.clamp(0, 10_000) as u16;
            map_result(platform.pwm_set(target, duty))
        }
        OutputKind::Dac => {
            let code = value.clamp(0, i32::from(u16::MAX)) as u16;
            map_result(platform.dac_write(target, code))
        }
        OutputKind::Uart | OutputKind::Spi | OutputKind::I2c | OutputKind::Modbus => {
            let payload = format_value(value, length);
            match custom_sink {
                Some(sink) => map_result(sink.deliver(kind, target, &payload)),
                None => DeliveryResult::Failed,
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_right_aligned() {
        let p = format_value(0x1234, 2);
        assert_eq!(p.as_slice(), &[0x34, 0x12]);

        let p = format_value(-2, 4);
        assert_eq!(p.as_slice(), &[0xFE, 0xFF, 0xFF, 0xFF]);

        // Sign extension beyond 32 bits for 8-byte payloads.
        let p = format_value(-1, 8);
        assert_eq!(p.as_slice(), &[0xFF; 8]);
    }

    #[test]
    fn length_clamped_to_frame() {
        assert_eq!(format_value(1, 0).len, 1);
        assert_eq!(format_value(1, 12).len, 8);
    }
}
