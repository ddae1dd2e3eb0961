//! Simulated actuator and analog source for hosted runs and self-checks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tempo_traits::{Actuator, AnalogInput, Clock};

/// Actuator that only records state. Lock-free, so it is safe from the
/// timer-expiry context.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    output: AtomicBool,
    indicator: AtomicBool,
    session: AtomicBool,
    pulses: AtomicU64,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of LOW→HIGH output transitions so far.
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::Acquire)
    }

    pub fn output_is_high(&self) -> bool {
        self.output.load(Ordering::Acquire)
    }

    pub fn indicator_is_on(&self) -> bool {
        self.indicator.load(Ordering::Acquire)
    }

    pub fn session_is_on(&self) -> bool {
        self.session.load(Ordering::Acquire)
    }
}

impl Actuator for SimulatedActuator {
    fn set_output(&self, high: bool) {
        if !self.output.swap(high, Ordering::AcqRel) && high {
            self.pulses.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn set_indicator(&self, on: bool) {
        self.indicator.store(on, Ordering::Release);
    }

    fn set_session(&self, on: bool) {
        self.session.store(on, Ordering::Release);
    }
}

/// Square wave derived from the clock, with a little deterministic noise.
pub struct SimulatedAnalog {
    clock: Arc<dyn Clock + Send + Sync>,
    origin_ms: i64,
    period_ms: i64,
    high_ms: i64,
    high_level: u16,
    low_level: u16,
    noise: u16,
    rng: u32,
}

impl SimulatedAnalog {
    /// `high_ms` of every `period_ms` reads near `high_level`, the rest near
    /// `low_level`. Phase zero is the construction time.
    pub fn new(
        clock: Arc<dyn Clock + Send + Sync>,
        period_ms: u32,
        high_ms: u32,
        high_level: u16,
        low_level: u16,
    ) -> Self {
        let origin_ms = clock.now_ms();
        Self {
            clock,
            origin_ms,
            period_ms: i64::from(period_ms.max(1)),
            high_ms: i64::from(high_ms),
            high_level,
            low_level,
            noise: 0,
            rng: 0x9E37_79B9,
        }
    }

    /// Add up to ±`amplitude` counts of noise to every reading.
    pub fn with_noise(mut self, amplitude: u16) -> Self {
        self.noise = amplitude;
        self
    }

    fn jitter(&mut self) -> i32 {
        if self.noise == 0 {
            return 0;
        }
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        let span = u32::from(self.noise) * 2 + 1;
        (x % span) as i32 - i32::from(self.noise)
    }
}

impl AnalogInput for SimulatedAnalog {
    fn read_level(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let phase = self
            .clock
            .now_ms()
            .saturating_sub(self.origin_ms)
            .rem_euclid(self.period_ms);
        let base = if phase < self.high_ms {
            self.high_level
        } else {
            self.low_level
        };
        let level = (i32::from(base) + self.jitter()).clamp(0, i32::from(u16::MAX));
        Ok(level as u16)
    }
}
