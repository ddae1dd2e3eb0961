//! Test doubles for `tempo_core`: a hand-fired timer, a recording sink and
//! actuator, and a scripted analog source.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tempo_traits::{
    Actuator, AnalogInput, ArmToken, Clock, ExpiryHandler, OneShotTimer, ResponseSink,
};

use crate::builder::TimerFactory;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ── ManualTimer ──────────────────────────────────────────────────────────────

/// One `start_once` call as seen by [`ManualTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub after: Duration,
    pub token: ArmToken,
}

#[derive(Default)]
struct TimerState {
    handler: Option<Arc<dyn ExpiryHandler>>,
    armed: VecDeque<ArmedTimer>,
    fail_next: bool,
}

/// One-shot timer that only fires when the test says so. Every arm is kept
/// (nothing is cancelled), so abandoned timers can be fired too.
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<TimerState>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timer factory for `DispatcherBuilder::with_timer` / `ActuationEngine::new`.
    pub fn factory(&self) -> TimerFactory {
        let timer = self.clone();
        Box::new(move |handler: Arc<dyn ExpiryHandler>| -> Box<dyn OneShotTimer + Send> {
            lock(&timer.state).handler = Some(handler);
            Box::new(timer)
        })
    }

    /// Make the next `start_once` fail.
    pub fn fail_next_arm(&self) {
        lock(&self.state).fail_next = true;
    }

    /// Timers armed and not yet fired, oldest first.
    pub fn armed(&self) -> Vec<ArmedTimer> {
        lock(&self.state).armed.iter().copied().collect()
    }

    /// Fire the oldest armed timer. Returns what fired.
    pub fn fire_next(&self) -> Option<ArmedTimer> {
        let (handler, next) = {
            let mut st = lock(&self.state);
            let next = st.armed.pop_front()?;
            (st.handler.clone(), next)
        };
        if let Some(h) = handler {
            h.on_expiry(next.token);
        }
        Some(next)
    }

    /// Fire everything still armed, oldest first.
    pub fn fire_all(&self) -> usize {
        let mut n = 0;
        while self.fire_next().is_some() {
            n += 1;
        }
        n
    }
}

impl OneShotTimer for ManualTimer {
    fn start_once(&mut self, after: Duration, token: ArmToken) -> Result<(), BoxError> {
        let mut st = lock(&self.state);
        if std::mem::take(&mut st.fail_next) {
            return Err(Box::new(std::io::Error::other("manual timer arm failure")));
        }
        st.armed.push_back(ArmedTimer { after, token });
        Ok(())
    }
}

// ── RecordingSink ────────────────────────────────────────────────────────────

/// Keeps every notified payload.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        lock(&self.frames).clone()
    }

    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *lock(&self.frames))
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

impl ResponseSink for RecordingSink {
    fn notify(&mut self, payload: &[u8]) -> Result<(), BoxError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other("sink closed")));
        }
        lock(&self.frames).push(payload.to_vec());
        Ok(())
    }
}

// ── RecordingActuator ────────────────────────────────────────────────────────

/// Counts pulses and remembers when the last output pulse started.
pub struct RecordingActuator {
    clock: Arc<dyn Clock + Send + Sync>,
    output_high: AtomicBool,
    indicator_on: AtomicBool,
    session_on: AtomicBool,
    settles: AtomicU32,
    output_pulses: AtomicU32,
    indicator_pulses: AtomicU32,
    last_pulse_ms: AtomicI64,
}

impl RecordingActuator {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            output_high: AtomicBool::new(false),
            indicator_on: AtomicBool::new(false),
            session_on: AtomicBool::new(false),
            settles: AtomicU32::new(0),
            output_pulses: AtomicU32::new(0),
            indicator_pulses: AtomicU32::new(0),
            last_pulse_ms: AtomicI64::new(i64::MIN),
        }
    }

    pub fn output_pulses(&self) -> u32 {
        self.output_pulses.load(Ordering::Acquire)
    }

    pub fn indicator_pulses(&self) -> u32 {
        self.indicator_pulses.load(Ordering::Acquire)
    }

    pub fn last_pulse_ms(&self) -> Option<i64> {
        let v = self.last_pulse_ms.load(Ordering::Acquire);
        (v != i64::MIN).then_some(v)
    }

    pub fn output_high(&self) -> bool {
        self.output_high.load(Ordering::Acquire)
    }

    pub fn indicator_on(&self) -> bool {
        self.indicator_on.load(Ordering::Acquire)
    }

    pub fn session_on(&self) -> bool {
        self.session_on.load(Ordering::Acquire)
    }

    /// How many times the normal context asked for deferred writes.
    pub fn settles(&self) -> u32 {
        self.settles.load(Ordering::Acquire)
    }
}

impl Actuator for RecordingActuator {
    fn set_output(&self, high: bool) {
        let was = self.output_high.swap(high, Ordering::AcqRel);
        if high && !was {
            self.last_pulse_ms
                .store(self.clock.now_ms(), Ordering::Release);
            self.output_pulses.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn set_indicator(&self, on: bool) {
        let was = self.indicator_on.swap(on, Ordering::AcqRel);
        if on && !was {
            self.indicator_pulses.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn set_session(&self, on: bool) {
        self.session_on.store(on, Ordering::Release);
    }

    fn settle(&self) -> u32 {
        self.settles.fetch_add(1, Ordering::AcqRel);
        0
    }
}

// ── ScriptedAnalog ───────────────────────────────────────────────────────────

/// Plays back a fixed list of readings; `None` entries fail the read. Once
/// the script runs out the last level repeats.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAnalog {
    script: VecDeque<Option<u16>>,
    last: u16,
}

impl ScriptedAnalog {
    pub fn new<I: IntoIterator<Item = Option<u16>>>(script: I) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: 0,
        }
    }

    pub fn from_levels<I: IntoIterator<Item = u16>>(levels: I) -> Self {
        Self::new(levels.into_iter().map(Some))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl AnalogInput for ScriptedAnalog {
    fn read_level(&mut self) -> Result<u16, BoxError> {
        match self.script.pop_front() {
            Some(Some(level)) => {
                self.last = level;
                Ok(level)
            }
            Some(None) => Err(Box::new(std::io::Error::other("scripted read failure"))),
            None => Ok(self.last),
        }
    }
}
