//! ISR→engine hand-off ring.
//!
//! Bounded multi-producer single-consumer ring of [`HwEvent`]. Producers
//! are ISRs (possibly on different cores or priority levels); the
//! consumer is the engine tick, which drains exactly once per tick.
//!
//! ## Protocol
//!
//! Per-slot sequence stamps coordinate producers and consumer:
//!
//! - A producer reserves the tail slot with a CAS on the tail index,
//!   writes the event, then publishes by storing `tail + 1` into the
//!   slot's sequence.
//! - The single consumer reads `head..tail` without CAS: a slot is ready
//!   when its sequence equals `head + 1`; consuming stores
//!   `head + capacity` to recycle the slot.
//!
//! `push` never blocks and never spins on a full ring: a full ring is
//! reported to the caller and counted, engine liveness is unaffected.
//! Producer-side timestamps travel with the event; the consumer does not
//! re-timestamp.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use thiserror::Error;

use sigflow_common::signal::HwEvent;

/// Error type for ring operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// All slots are occupied; the event was dropped and counted.
    #[error("ring full")]
    Full,
}

struct Slot {
    /// Sequence stamp driving the reserve/publish/recycle protocol.
    seq: AtomicUsize,
    /// Event payload; valid only per the sequence protocol.
    event: UnsafeCell<HwEvent>,
}

/// Bounded MPSC ring buffer for hardware events.
///
/// Capacity is a power of two fixed at init. Shared between ISR
/// producers (via [`RingProducer`]) and the engine consumer.
pub struct IsrRing {
    slots: Box<[Slot]>,
    /// Index mask (capacity - 1).
    mask: usize,
    /// Producer reservation index.
    tail: AtomicUsize,
    /// Consumer index; written only by the single consumer.
    head: AtomicUsize,
    /// Events rejected because the ring was full.
    dropped: AtomicU64,
}

// SAFETY: slot payloads are only written by the producer that reserved
// the slot (CAS on tail) and only read by the single consumer after the
// Release store of the matching sequence stamp.
unsafe impl Send for IsrRing {}
unsafe impl Sync for IsrRing {}

impl IsrRing {
    /// Create a ring with the given power-of-two capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a power of two. Capacity is
    /// validated at config load; this is the last line of defense.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "ring capacity {capacity} must be a power of two >= 2"
        );
        let slots = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                event: UnsafeCell::new(HwEvent::new(0, 0, 0)),
            })
            .collect();
        Self {
            slots,
            mask: capacity - 1,
            tail: AtomicUsize::new(0),
            head: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Total events dropped due to a full ring.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Approximate number of queued events (racy; for stats only).
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head)
    }

    /// Whether the ring currently appears empty (racy; for stats only).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one event. Safe from interrupt context; never blocks.
    ///
    /// On a full ring the event is discarded, the dropped counter is
    /// incremented, and `RingError::Full` is returned.
    pub fn push(&self, event: HwEvent) -> Result<(), RingError> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - tail as isize;

            if dif == 0 {
                // Slot free at our position: reserve it.
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gives this producer exclusive
                        // ownership of the slot until the seq store below.
                        unsafe { *slot.event.get() = event };
                        slot.seq.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => tail = current,
                }
            } else if dif < 0 {
                // Slot not yet recycled by the consumer: ring is full.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(RingError::Full);
            } else {
                // Another producer advanced past us; reload and retry.
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Pop one event in FIFO order.
    ///
    /// Must only be called by the single consumer (the engine tick).
    pub fn pop(&self) -> Option<HwEvent> {
        let head = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[head & self.mask];
        let seq = slot.seq.load(Ordering::Acquire);
        if (seq as isize - head.wrapping_add(1) as isize) < 0 {
            return None;
        }
        // SAFETY: the Acquire load above pairs with the producer's
        // Release store; the slot holds a fully written event.
        let event = unsafe { *slot.event.get() };
        slot.seq
            .store(head.wrapping_add(self.capacity()), Ordering::Release);
        self.head.store(head.wrapping_add(1), Ordering::Relaxed);
        Some(event)
    }

    /// Drain up to `max` events into `sink`, FIFO. Returns the count.
    ///
    /// Called exactly once per tick by the engine.
    pub fn drain_into(&self, max: usize, mut sink: impl FnMut(HwEvent)) -> usize {
        let mut n = 0;
        while n < max {
            match self.pop() {
                Some(ev) => {
                    sink(ev);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

// ─── Producer Handle ────────────────────────────────────────────────

/// Cloneable producer half handed to ISR bindings.
///
/// ISRs hold only this handle, never a reference to the engine.
#[derive(Clone)]
pub struct RingProducer {
    ring: Arc<IsrRing>,
}

impl RingProducer {
    /// Wrap a shared ring.
    pub fn new(ring: Arc<IsrRing>) -> Self {
        Self { ring }
    }

    /// Push a `(signal, value, timestamp)` triple. Wait-free; a full
    /// ring drops the event and bumps the shared dropped counter.
    #[inline]
    pub fn push(&self, signal_id: u16, value: i32, timestamp_us: u64) -> Result<(), RingError> {
        self.ring.push(HwEvent::new(signal_id, value, timestamp_us))
    }

    /// Total events dropped on this ring.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.ring.dropped()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: u16, v: i32) -> HwEvent {
        HwEvent::new(id, v, u64::from(id) * 10)
    }

    #[test]
    fn fifo_order_preserved() {
        let ring = IsrRing::with_capacity(8);
        for i in 0..5 {
            ring.push(ev(i, i as i32 * 100)).unwrap();
        }
        for i in 0..5 {
            let e = ring.pop().expect("event");
            assert_eq!(e.signal_id, i);
            assert_eq!(e.value, i as i32 * 100);
            assert_eq!(e.timestamp_us, u64::from(i) * 10);
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        // Capacity 4, 6 pushes: first 4 delivered, pushes 5 and 6 lost.
        let ring = IsrRing::with_capacity(4);
        for i in 0..6 {
            let r = ring.push(ev(i, i as i32));
            if i < 4 {
                assert!(r.is_ok());
            } else {
                assert_eq!(r, Err(RingError::Full));
            }
        }
        assert_eq!(ring.dropped(), 2);

        let mut got = Vec::new();
        ring.drain_into(64, |e| got.push(e.signal_id));
        assert_eq!(got, vec![0, 1, 2, 3]);

        // The dropped events do not appear on a later drain either.
        assert_eq!(ring.drain_into(64, |_| ()), 0);
    }

    #[test]
    fn wraparound_many_times() {
        let ring = IsrRing::with_capacity(4);
        for round in 0u16..100 {
            ring.push(ev(round, round as i32)).unwrap();
            let e = ring.pop().unwrap();
            assert_eq!(e.signal_id, round);
        }
        assert_eq!(ring.dropped(), 0);
    }

    #[test]
    fn drain_respects_max() {
        let ring = IsrRing::with_capacity(16);
        for i in 0..10 {
            ring.push(ev(i, 0)).unwrap();
        }
        assert_eq!(ring.drain_into(4, |_| ()), 4);
        assert_eq!(ring.drain_into(64, |_| ()), 6);
    }

    #[test]
    fn concurrent_producers_no_loss_no_reorder() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        const PER_PRODUCER: usize = 10_000;
        const PRODUCERS: u16 = 4;

        let ring = Arc::new(IsrRing::with_capacity(1024));
        let done = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let producer = RingProducer::new(Arc::clone(&ring));
            handles.push(thread::spawn(move || {
                let mut pushed = 0u64;
                for i in 0..PER_PRODUCER {
                    if producer.push(p, i as i32, 0).is_ok() {
                        pushed += 1;
                    }
                }
                pushed
            }));
        }

        let consumer = {
            let ring = Arc::clone(&ring);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                // Track per-producer last seen value to verify per-producer FIFO.
                let mut last = [-1i32; PRODUCERS as usize];
                let mut total = 0u64;
                loop {
                    let drained = ring.drain_into(64, |e| {
                        let p = e.signal_id as usize;
                        assert!(e.value > last[p], "per-producer order violated");
                        last[p] = e.value;
                    });
                    total += drained as u64;
                    if drained == 0 && done.load(Ordering::Acquire) && ring.is_empty() {
                        break;
                    }
                }
                total
            })
        };

        let mut pushed_total = 0u64;
        for h in handles {
            pushed_total += h.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let consumed = consumer.join().unwrap();

        assert_eq!(consumed, pushed_total);
        assert_eq!(
            ring.dropped() + pushed_total,
            u64::from(PRODUCERS) * PER_PRODUCER as u64
        );
    }
}
