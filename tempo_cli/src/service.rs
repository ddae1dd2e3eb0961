//! The service loop: transport events in, dispatcher and monitor polled,
//! completed series exported.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempo_core::{
    Dispatcher, SeriesSummary, SignalMonitor, SignalReport, StatsSnapshot, TransportEvent,
    export_summary,
};
use tempo_traits::{AnalogInput, Clock};
use tracing::{info, warn};

use crate::csv_export::write_series_csv;
use crate::transport::UdpTransport;

pub type DynAnalog = Box<dyn AnalogInput + Send>;

pub struct Service {
    clock: Arc<dyn Clock + Send + Sync>,
    dispatcher: Dispatcher,
    transport: UdpTransport,
    monitor: Option<SignalMonitor<DynAnalog>>,
    export_csv: Option<PathBuf>,
    events: Vec<TransportEvent>,
    exports: usize,
}

/// What the service saw, reported on shutdown.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub uptime_ms: i64,
    pub stats: StatsSnapshot,
    pub series: SeriesSummary,
    pub csv_exports: usize,
    pub signal: Option<SignalReport>,
}

impl Service {
    pub fn new(
        clock: Arc<dyn Clock + Send + Sync>,
        dispatcher: Dispatcher,
        transport: UdpTransport,
        monitor: Option<SignalMonitor<DynAnalog>>,
        export_csv: Option<PathBuf>,
    ) -> Self {
        Self {
            clock,
            dispatcher,
            transport,
            monitor,
            export_csv,
            events: Vec::with_capacity(8),
            exports: 0,
        }
    }

    /// One pass of the loop. The transport read timeout bounds how long a
    /// quiet pass takes.
    pub fn step(&mut self) {
        self.transport.poll(&*self.clock, &mut self.events);
        for event in self.events.drain(..) {
            self.dispatcher.handle_event(event);
        }

        let now = self.clock.now_ms();
        self.dispatcher.poll(now);
        if self.dispatcher.take_series_completed() {
            self.export_series();
        }

        if let Some(monitor) = self.monitor.as_mut()
            && let Some(sample) = monitor.poll(now)
            && sample.completed
        {
            monitor.stop();
        }
    }

    fn export_series(&mut self) {
        let Some(path) = self.export_csv.as_deref() else {
            return;
        };
        match write_series_csv(path, self.dispatcher.series()) {
            Ok(rows) => {
                self.exports += 1;
                info!(path = %path.display(), rows, "series exported");
            }
            Err(e) => warn!(error = %e, path = %path.display(), "series export failed"),
        }
    }

    /// Loop until `shutdown` is set or `run_for_ms` has elapsed.
    pub fn run(&mut self, shutdown: &AtomicBool, run_for_ms: Option<u64>) -> ServiceReport {
        let started = self.clock.now_ms();
        let stop_at = run_for_ms.map(|ms| started.saturating_add(i64::try_from(ms).unwrap_or(i64::MAX)));
        info!(run_for_ms, "service running");

        while !shutdown.load(Ordering::Relaxed) {
            if let Some(stop_at) = stop_at
                && self.clock.now_ms() >= stop_at
            {
                break;
            }
            self.step();
        }

        let report = self.report(self.clock.now_ms().saturating_sub(started));
        info!(
            uptime_ms = report.uptime_ms,
            commands = report.stats.total_commands,
            within_pct = report.stats.within_tolerance_pct(),
            stale_expiries = report.stats.stale_expiries,
            "service stopped"
        );
        report
    }

    pub fn report(&self, uptime_ms: i64) -> ServiceReport {
        ServiceReport {
            uptime_ms,
            stats: self.dispatcher.stats(),
            series: export_summary(self.dispatcher.series()),
            csv_exports: self.exports,
            signal: self.monitor.as_ref().map(SignalMonitor::report),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }
}
