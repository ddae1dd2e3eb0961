//! Scheduled actuation.
//!
//! An actuation either runs immediately in the caller's (normal) context or
//! is handed to a one-shot timer whose expiry runs in a restricted context.
//! The two sides share exactly three things, all atomics:
//!
//! - the pending slot: the armed generation (0 = nothing pending) plus the
//!   target/sequence for inspection,
//! - [`RunningStats`],
//! - a single-slot completion mailbox the normal context drains for logging.
//!
//! The restricted side only ever sees an [`ExpiryContext`], which can read
//! the clock, pulse the actuator, clear its own pending flag and record
//! stats. It has no way to reach the transport or the logger.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tempo_traits::{Actuator, ArmToken, Clock, ExpiryHandler, OneShotTimer};

use crate::error::TempoError;
use crate::protocol::{ActuateRequest, Response};
use crate::stats::RunningStats;
use crate::util::{delay_from_ms, wire_to_ms};

/// Delays at or beyond this are executed immediately instead of armed.
pub const MAX_SCHEDULE_AHEAD_MS: i64 = 1_000;
/// Output hold time of one actuation.
pub const PULSE_WIDTH: Duration = Duration::from_micros(100);
/// Indicator flash following the output pulse.
pub const INDICATOR_WIDTH: Duration = Duration::from_micros(50);

/// Drive the fixed-width output pulse, then the indicator flash.
#[inline]
pub fn fire_pulse(actuator: &dyn Actuator, clock: &dyn Clock) {
    actuator.set_output(true);
    clock.delay(PULSE_WIDTH);
    actuator.set_output(false);

    actuator.set_indicator(true);
    clock.delay(INDICATOR_WIDTH);
    actuator.set_indicator(false);
}

/// Result of a deferred actuation, published by the expiry context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub sequence: u16,
    /// `executed_at - target`, clamped to `i32`.
    pub error_ms: i32,
}

const COMPLETION_PRESENT: u64 = 1 << 63;

impl Completion {
    #[inline]
    fn pack(self) -> u64 {
        COMPLETION_PRESENT | (u64::from(self.sequence) << 32) | u64::from(self.error_ms as u32)
    }

    #[inline]
    fn unpack(v: u64) -> Option<Self> {
        (v & COMPLETION_PRESENT != 0).then(|| Self {
            sequence: ((v >> 32) & 0xFFFF) as u16,
            error_ms: (v as u32) as i32,
        })
    }
}

/// An armed, not yet executed actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingActuation {
    pub generation: u32,
    pub target_ms: i64,
    pub sequence: u16,
}

#[derive(Debug, Default)]
struct PendingSlot {
    armed: AtomicU32,
    target_ms: AtomicI64,
    sequence: AtomicU16,
}

struct Shared {
    clock: Arc<dyn Clock + Send + Sync>,
    actuator: Arc<dyn Actuator>,
    stats: Arc<RunningStats>,
    slot: PendingSlot,
    completion: AtomicU64,
}

/// Capability-limited handle given to the timer.
#[derive(Clone)]
pub struct ExpiryContext {
    shared: Arc<Shared>,
}

impl ExpiryHandler for ExpiryContext {
    fn on_expiry(&self, token: ArmToken) {
        let s = &self.shared;
        // Only the generation that is still armed may fire; a re-arm has
        // already replaced it otherwise.
        if s.slot
            .armed
            .compare_exchange(token.generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            s.stats.note_stale_expiry();
            return;
        }

        let executed_at = s.clock.now_ms();
        fire_pulse(&*s.actuator, &*s.clock);

        let error = executed_at.saturating_sub(token.target_ms);
        s.stats.record(error.unsigned_abs());
        let done = Completion {
            sequence: token.sequence,
            error_ms: error.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        };
        s.completion.store(done.pack(), Ordering::Release);
    }
}

/// What `actuate` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationOutcome {
    /// Executed in the calling context; the only path that answers.
    Immediate {
        actuation_id: u8,
        sequence: u16,
        received_at: i64,
        executed_at: i64,
        error_ms: i64,
    },
    /// Armed on the one-shot timer.
    Scheduled {
        sequence: u16,
        received_at: i64,
        delay_ms: i64,
        /// Pending actuation this one replaced, if any.
        superseded: Option<PendingActuation>,
    },
}

impl ActuationOutcome {
    /// The response frame, present only for immediate execution.
    pub fn response(&self) -> Option<Response> {
        match *self {
            Self::Immediate {
                actuation_id,
                sequence,
                received_at,
                executed_at,
                ..
            } => Some(Response::Actuated {
                actuation_id,
                received_at,
                executed_at,
                sequence,
            }),
            Self::Scheduled { .. } => None,
        }
    }
}

pub struct ActuationEngine {
    shared: Arc<Shared>,
    timer: Box<dyn OneShotTimer + Send>,
    generation: u32,
}

impl core::fmt::Debug for ActuationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActuationEngine")
            .field("generation", &self.generation)
            .field("pending", &self.pending())
            .finish()
    }
}

impl ActuationEngine {
    /// `make_timer` receives the expiry handle the timer must call.
    pub fn new<F>(
        clock: Arc<dyn Clock + Send + Sync>,
        actuator: Arc<dyn Actuator>,
        stats: Arc<RunningStats>,
        make_timer: F,
    ) -> Self
    where
        F: FnOnce(Arc<dyn ExpiryHandler>) -> Box<dyn OneShotTimer + Send>,
    {
        let shared = Arc::new(Shared {
            clock,
            actuator,
            stats,
            slot: PendingSlot::default(),
            completion: AtomicU64::new(0),
        });
        let handler: Arc<dyn ExpiryHandler> = Arc::new(ExpiryContext {
            shared: Arc::clone(&shared),
        });
        Self {
            shared,
            timer: make_timer(handler),
            generation: 0,
        }
    }

    pub fn actuate(&mut self, req: &ActuateRequest) -> Result<ActuationOutcome, TempoError> {
        let received_at = self.shared.clock.now_ms();
        let execute_at = wire_to_ms(req.execute_at);
        let delay_ms = execute_at.saturating_sub(received_at);

        if delay_ms > 0 && delay_ms < MAX_SCHEDULE_AHEAD_MS {
            return self.arm(req, execute_at, received_at, delay_ms);
        }

        let executed_at = self.shared.clock.now_ms();
        fire_pulse(&*self.shared.actuator, &*self.shared.clock);
        let error_ms = executed_at.saturating_sub(execute_at);
        self.shared.stats.record(error_ms.unsigned_abs());
        Ok(ActuationOutcome::Immediate {
            actuation_id: req.actuation_id,
            sequence: req.sequence,
            received_at,
            executed_at,
            error_ms,
        })
    }

    fn arm(
        &mut self,
        req: &ActuateRequest,
        execute_at: i64,
        received_at: i64,
        delay_ms: i64,
    ) -> Result<ActuationOutcome, TempoError> {
        let superseded = self.pending();
        self.generation = self.generation.wrapping_add(1).max(1);
        let token = ArmToken {
            generation: self.generation,
            target_ms: execute_at,
            sequence: req.sequence,
        };

        let slot = &self.shared.slot;
        slot.target_ms.store(execute_at, Ordering::Relaxed);
        slot.sequence.store(req.sequence, Ordering::Relaxed);
        slot.armed.store(token.generation, Ordering::Release);

        if let Err(e) = self.timer.start_once(delay_from_ms(delay_ms), token) {
            // Nothing will fire for this generation; withdraw it.
            let _ = slot.armed.compare_exchange(
                token.generation,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            return Err(TempoError::Timer(e.to_string()));
        }

        Ok(ActuationOutcome::Scheduled {
            sequence: req.sequence,
            received_at,
            delay_ms,
            superseded,
        })
    }

    /// The currently armed actuation, if its timer has not fired yet.
    pub fn pending(&self) -> Option<PendingActuation> {
        let slot = &self.shared.slot;
        let generation = slot.armed.load(Ordering::Acquire);
        (generation != 0).then(|| PendingActuation {
            generation,
            target_ms: slot.target_ms.load(Ordering::Relaxed),
            sequence: slot.sequence.load(Ordering::Relaxed),
        })
    }

    /// Drain the latest deferred completion. Normal context only.
    pub fn take_completion(&self) -> Option<Completion> {
        Completion::unpack(self.shared.completion.swap(0, Ordering::Acquire))
    }

    /// Re-apply actuator writes the expiry context had to defer. Normal
    /// context only.
    pub fn settle_outputs(&self) -> u32 {
        self.shared.actuator.settle()
    }

    pub fn set_session_indicator(&self, on: bool) {
        self.shared.actuator.set_session(on);
    }

    /// A handle equivalent to the one given to the timer.
    pub fn expiry_context(&self) -> ExpiryContext {
        ExpiryContext {
            shared: Arc::clone(&self.shared),
        }
    }
}
