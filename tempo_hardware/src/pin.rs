//! Output pin shared by the normal and timer-expiry contexts.
//!
//! Writers never block. Every write takes a ticket; a writer that cannot get
//! the pin parks its level under that ticket and whoever holds the pin next
//! applies it. The highest ticket always wins, so a parked deassert is never
//! lost or overtaken by an older assert. [`GuardedPin::settle`] is the
//! normal-context backstop for a parked level nobody picked up.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Attempts to take the pin before the write is parked.
const LOCK_SPINS: u32 = 64;

/// A digital output level sink.
pub trait PinWrite {
    fn write(&mut self, high: bool);
}

struct Held<P> {
    pin: P,
    /// Ticket of the last level written to `pin`.
    applied: u64,
}

impl<P: PinWrite> Held<P> {
    fn apply(&mut self, ticket: u64, high: bool) {
        if ticket > self.applied {
            self.pin.write(high);
            self.applied = ticket;
        }
    }

    fn apply_parked(&mut self, parked: &AtomicU64) {
        let p = parked.load(Ordering::Acquire);
        if p != 0 {
            self.apply(p >> 1, p & 1 == 1);
        }
    }
}

pub struct GuardedPin<P> {
    held: Mutex<Held<P>>,
    tickets: AtomicU64,
    /// `ticket << 1 | level` of the newest parked write; 0 when none.
    parked: AtomicU64,
    deferred: AtomicU32,
}

impl<P: PinWrite> GuardedPin<P> {
    pub fn new(pin: P) -> Self {
        Self {
            held: Mutex::new(Held { pin, applied: 0 }),
            tickets: AtomicU64::new(1),
            parked: AtomicU64::new(0),
            deferred: AtomicU32::new(0),
        }
    }

    /// Safe from the expiry context: spins briefly, then parks.
    pub fn write(&self, high: bool) {
        let ticket = self.tickets.fetch_add(1, Ordering::AcqRel);
        for _ in 0..LOCK_SPINS {
            if let Ok(mut h) = self.held.try_lock() {
                h.apply(ticket, high);
                h.apply_parked(&self.parked);
                return;
            }
            std::hint::spin_loop();
        }

        self.parked
            .fetch_max((ticket << 1) | u64::from(high), Ordering::AcqRel);
        self.deferred.fetch_add(1, Ordering::Relaxed);
        // The holder may have released before seeing the parked level.
        if let Ok(mut h) = self.held.try_lock() {
            h.apply_parked(&self.parked);
        }
    }

    /// Apply any parked level, waiting for the pin if needed. Normal context
    /// only. Returns the writes parked since the last call.
    pub fn settle(&self) -> u32 {
        let mut h = self.held.lock().unwrap_or_else(|e| e.into_inner());
        h.apply_parked(&self.parked);
        self.deferred.swap(0, Ordering::Relaxed)
    }
}
