//! Command dispatch.
//!
//! The transport feeds [`TransportEvent`]s in; the dispatcher parses each
//! written frame, routes it, and notifies the response back through the
//! [`ResponseSink`] while a session is active. Malformed input is logged and
//! dropped, never propagated.

use std::sync::Arc;

use tempo_traits::{Clock, ResponseSink};
use tracing::{debug, info, warn};

use crate::actuation::{ActuationEngine, ActuationOutcome};
use crate::config::DispatchCfg;
use crate::export::{export_binary, export_summary};
use crate::periodic::{PeriodicSeries, RecordRejected, SERIES_CAPACITY};
use crate::protocol::{Command, Response};
use crate::stats::{RunningStats, StatsReporter, StatsSnapshot};
use crate::time_sync::TimeSyncResponder;

/// What the transport reports to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// A command frame written by the peer.
    Write(Vec<u8>),
}

pub struct Dispatcher {
    clock: Arc<dyn Clock + Send + Sync>,
    sync: TimeSyncResponder,
    engine: ActuationEngine,
    series: PeriodicSeries,
    stats: Arc<RunningStats>,
    sink: Box<dyn ResponseSink + Send>,
    session_active: bool,
    reporter: StatsReporter,
    series_completed: bool,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("session_active", &self.session_active)
            .field("series_running", &self.series.is_running())
            .field("series_samples", &self.series.sample_count())
            .field("engine", &self.engine)
            .finish()
    }
}

impl Dispatcher {
    pub(crate) fn from_parts(
        clock: Arc<dyn Clock + Send + Sync>,
        engine: ActuationEngine,
        stats: Arc<RunningStats>,
        sink: Box<dyn ResponseSink + Send>,
        cfg: &DispatchCfg,
    ) -> Self {
        Self {
            sync: TimeSyncResponder::new(Arc::clone(&clock)),
            clock,
            engine,
            series: PeriodicSeries::new(cfg.tolerance_ms),
            stats,
            sink,
            session_active: false,
            reporter: StatsReporter::new(cfg.report_interval_ms),
            series_completed: false,
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.session_active = true;
                self.engine.set_session_indicator(true);
                info!("session connected");
            }
            TransportEvent::Disconnected => {
                self.session_active = false;
                self.engine.set_session_indicator(false);
                info!("session disconnected");
            }
            TransportEvent::Write(frame) => {
                if let Some(resp) = self.dispatch(&frame) {
                    self.deliver(&resp);
                }
            }
        }
    }

    /// Parse and route one frame. Returns the response it produced, whether
    /// or not a session is there to receive it.
    pub fn dispatch(&mut self, frame: &[u8]) -> Option<Response> {
        let cmd = match Command::parse(frame) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(error = %e, len = frame.len(), "dropping malformed frame");
                return None;
            }
        };
        debug!(opcode = ?cmd.opcode(), "frame routed");

        match cmd {
            Command::TimeSync { t1 } => Some(self.sync.respond(t1).into()),
            Command::Actuate(req) => match self.engine.actuate(&req) {
                Ok(outcome) => {
                    log_outcome(&outcome);
                    outcome.response()
                }
                Err(e) => {
                    warn!(error = %e, sequence = req.sequence, "actuation dropped");
                    None
                }
            },
            Command::PeriodicStart { count, period_ms } => {
                if usize::from(count) > SERIES_CAPACITY {
                    warn!(
                        requested = count,
                        capacity = SERIES_CAPACITY,
                        "periodic count clamped to capacity"
                    );
                }
                self.series.start(usize::from(count), u32::from(period_ms));
                self.series_completed = false;
                info!(
                    count = self.series.expected_count(),
                    period_ms, "periodic series started"
                );
                Some(Response::PeriodicStarted)
            }
            Command::PeriodicSignal { sequence, sent_at } => {
                self.record_signal(sequence, sent_at);
                None
            }
            Command::GetResults => match export_binary(&self.series) {
                Ok(bytes) => Some(Response::Results(bytes)),
                Err(e) => {
                    warn!(error = %e, "results not sent");
                    None
                }
            },
        }
    }

    fn record_signal(&mut self, sequence: u16, sent_at: u64) {
        let received_at = self.clock.now_ms();
        match self.series.record(received_at) {
            Ok(sample) => {
                debug!(
                    sequence,
                    sent_at,
                    index = sample.index,
                    deviation_ms = sample.deviation,
                    "periodic signal"
                );
                if sample.completed {
                    let summary = export_summary(&self.series);
                    info!(
                        samples = summary.sample_count,
                        avg_deviation_ms = summary.average_deviation_ms,
                        max_abs_deviation_ms = summary.max_abs_deviation_ms,
                        within_pct = summary.within_tolerance_pct,
                        tolerance_ms = summary.tolerance_ms,
                        "periodic series complete"
                    );
                    self.series_completed = true;
                }
            }
            Err(RecordRejected::NotRunning) => {
                debug!(sequence, "signal outside a running series ignored");
            }
            Err(e @ RecordRejected::Full) => {
                warn!(sequence, error = %e, "periodic signal dropped");
            }
        }
    }

    fn deliver(&mut self, resp: &Response) {
        if !self.session_active {
            debug!("no active session; response discarded");
            return;
        }
        if let Err(e) = self.sink.notify(&resp.encode()) {
            warn!(error = %e, "response notify failed");
        }
    }

    /// Normal-context housekeeping, once per loop pass. Settles actuator
    /// pins and drains the deferred completion. Also emits the periodic
    /// stats line when due.
    pub fn poll(&mut self, now_ms: i64) {
        let deferred = self.engine.settle_outputs();
        if deferred > 0 {
            warn!(deferred, "actuator writes deferred by pin contention were re-applied");
        }
        if let Some(done) = self.engine.take_completion() {
            info!(
                sequence = done.sequence,
                error_ms = done.error_ms,
                "deferred actuation executed"
            );
        }
        self.reporter
            .poll(now_ms, &self.stats, self.session_active);
    }

    /// True once after each command series fills up.
    pub fn take_series_completed(&mut self) -> bool {
        std::mem::take(&mut self.series_completed)
    }

    pub fn session_active(&self) -> bool {
        self.session_active
    }

    pub fn series(&self) -> &PeriodicSeries {
        &self.series
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn engine(&self) -> &ActuationEngine {
        &self.engine
    }
}

fn log_outcome(outcome: &ActuationOutcome) {
    match *outcome {
        ActuationOutcome::Immediate {
            sequence,
            received_at,
            executed_at,
            error_ms,
            ..
        } => debug!(
            sequence,
            received_at, executed_at, error_ms, "actuation executed immediately"
        ),
        ActuationOutcome::Scheduled {
            sequence,
            delay_ms,
            superseded,
            ..
        } => {
            if let Some(old) = superseded {
                debug!(
                    sequence,
                    replaced = old.sequence,
                    "pending actuation superseded"
                );
            }
            debug!(sequence, delay_ms, "actuation timer armed");
        }
    }
}
