//! Scripted end-to-end session on the simulated backend.
//!
//! Exercises the real clock and the thread-backed timer, so it also catches
//! a host that cannot keep up with millisecond scheduling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempo_core::export::decode_binary;
use tempo_core::mocks::RecordingSink;
use tempo_core::{ActuateRequest, Command, Dispatcher, DispatchCfg, StatsSnapshot, TransportEvent};
use tempo_hardware::{SimulatedActuator, ThreadTimer};
use tempo_traits::{Clock, MonotonicClock};

use crate::error_fmt::CliError;

const DEFERRED_DELAY_MS: u64 = 20;
const SERIES_COUNT: u16 = 5;
const SERIES_PERIOD_MS: u16 = 20;
/// How long to wait for the deferred pulse before giving up.
const DEFERRED_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CheckStep {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct SelfCheckReport {
    pub steps: Vec<CheckStep>,
    pub stats: StatsSnapshot,
    pub deviations: Vec<i16>,
}

impl SelfCheckReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    /// `Ok` when every step passed, otherwise a [`CliError::SelfCheck`].
    pub fn into_result(self) -> eyre::Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        let failed = self
            .steps
            .iter()
            .filter(|s| !s.ok)
            .map(|s| format!("{}: {}", s.name, s.detail))
            .collect();
        Err(CliError::SelfCheck(failed).into())
    }
}

struct Session {
    clock: Arc<dyn Clock + Send + Sync>,
    actuator: Arc<SimulatedActuator>,
    sink: RecordingSink,
    dispatcher: Dispatcher,
    steps: Vec<CheckStep>,
}

impl Session {
    fn new(tolerance_ms: u32) -> eyre::Result<Self> {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
        let actuator = Arc::new(SimulatedActuator::new());
        let sink = RecordingSink::new();
        let dispatcher = Dispatcher::builder()
            .with_clock(Arc::clone(&clock))
            .with_actuator(actuator.clone())
            .with_timer(ThreadTimer::factory())
            .with_sink(Box::new(sink.clone()))
            .with_config(DispatchCfg {
                tolerance_ms,
                report_interval_ms: 0,
            })
            .try_build()?;
        Ok(Self {
            clock,
            actuator,
            sink,
            dispatcher,
            steps: Vec::new(),
        })
    }

    fn now(&self) -> u64 {
        u64::try_from(self.clock.now_ms()).unwrap_or(0)
    }

    fn send(&mut self, cmd: Command) -> Vec<Vec<u8>> {
        self.dispatcher
            .handle_event(TransportEvent::Write(cmd.encode()));
        self.sink.take()
    }

    fn check(&mut self, name: &'static str, ok: bool, detail: String) {
        if ok {
            tracing::debug!(step = name, %detail, "self-check step passed");
        } else {
            tracing::warn!(step = name, %detail, "self-check step failed");
        }
        self.steps.push(CheckStep { name, ok, detail });
    }

    fn time_sync(&mut self) {
        let t1 = self.now();
        let frames = self.send(Command::TimeSync { t1 });
        let detail = match frames.as_slice() {
            [f] if f.len() == 25 && f[0] == 0x01 => {
                let echoed = u64::from_le_bytes(f[1..9].try_into().unwrap_or_default());
                let t2 = i64::from_le_bytes(f[9..17].try_into().unwrap_or_default());
                let t3 = i64::from_le_bytes(f[17..25].try_into().unwrap_or_default());
                if echoed == t1 && t3 >= t2 {
                    Ok(format!("t2={t2} t3={t3}"))
                } else {
                    Err(format!("bad timestamps t1={echoed} t2={t2} t3={t3}"))
                }
            }
            other => Err(format!("expected one 25-byte reply, got {} frame(s)", other.len())),
        };
        self.check_result("time sync", detail);
    }

    fn immediate_actuation(&mut self) {
        let before = self.actuator.pulses();
        let now = self.now();
        let frames = self.send(Command::Actuate(ActuateRequest {
            actuation_id: 1,
            sent_at: now,
            execute_at: now,
            sequence: 1,
        }));
        let pulses = self.actuator.pulses() - before;
        let detail = match frames.as_slice() {
            [f] if f.len() == 20 && f[0] == 0x02 && f[18..20] == [1, 0] && pulses == 1 => {
                Ok("acknowledged, one pulse".to_string())
            }
            _ => Err(format!("{} frame(s), {pulses} pulse(s)", frames.len())),
        };
        self.check_result("immediate actuation", detail);
    }

    fn deferred_actuation(&mut self) {
        let before = self.actuator.pulses();
        let now = self.now();
        let frames = self.send(Command::Actuate(ActuateRequest {
            actuation_id: 2,
            sent_at: now,
            execute_at: now + DEFERRED_DELAY_MS,
            sequence: 2,
        }));
        let started = Instant::now();
        while self.actuator.pulses() == before && started.elapsed() < DEFERRED_WAIT {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.dispatcher.poll(self.clock.now_ms());

        let pulses = self.actuator.pulses() - before;
        let pending = self.dispatcher.engine().pending();
        let detail = if !frames.is_empty() {
            Err(format!("deferred actuation replied with {} frame(s)", frames.len()))
        } else if pulses != 1 || pending.is_some() {
            Err(format!("{pulses} pulse(s) after {:?}", started.elapsed()))
        } else {
            Ok(format!("fired after {:?}", started.elapsed()))
        };
        self.check_result("deferred actuation", detail);
    }

    fn periodic_series(&mut self) -> Vec<i16> {
        let ack = self.send(Command::PeriodicStart {
            count: SERIES_COUNT,
            period_ms: SERIES_PERIOD_MS,
        });
        if ack != [vec![1, 0]] {
            self.check_result("periodic start", Err(format!("unexpected ack {ack:?}")));
            return Vec::new();
        }

        let base = self.clock.now_ms();
        for k in 0..SERIES_COUNT {
            let due = base + i64::from(k) * i64::from(SERIES_PERIOD_MS);
            let wait = due - self.clock.now_ms();
            if wait > 0 {
                self.clock.delay(Duration::from_millis(wait.unsigned_abs()));
            }
            let sent_at = self.now();
            let _ = self.send(Command::PeriodicSignal {
                sequence: k,
                sent_at,
            });
        }

        let frames = self.send(Command::GetResults);
        let decoded = match frames.as_slice() {
            [f] => decode_binary(f).map_err(|e| e.to_string()),
            other => Err(format!("expected one result frame, got {}", other.len())),
        };
        match decoded {
            Ok(devs) if devs.len() == usize::from(SERIES_COUNT) && devs[0] == 0 => {
                self.check("periodic series", true, format!("deviations {devs:?}"));
                devs
            }
            Ok(devs) => {
                self.check("periodic series", false, format!("deviations {devs:?}"));
                devs
            }
            Err(e) => {
                self.check("periodic series", false, e);
                Vec::new()
            }
        }
    }

    fn check_result(&mut self, name: &'static str, r: Result<String, String>) {
        match r {
            Ok(detail) => self.check(name, true, detail),
            Err(detail) => self.check(name, false, detail),
        }
    }
}

pub fn run_self_check(tolerance_ms: u32) -> eyre::Result<SelfCheckReport> {
    let mut s = Session::new(tolerance_ms)?;
    s.dispatcher.handle_event(TransportEvent::Connected);

    s.time_sync();
    s.immediate_actuation();
    s.deferred_actuation();
    let deviations = s.periodic_series();

    s.dispatcher.handle_event(TransportEvent::Disconnected);
    Ok(SelfCheckReport {
        stats: s.dispatcher.stats(),
        steps: s.steps,
        deviations,
    })
}
