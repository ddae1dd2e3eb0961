//! Builder for [`Dispatcher`].
//!
//! The actuator, the one-shot timer and the response sink are required; the
//! clock defaults to [`MonotonicClock`] and the config to
//! [`DispatchCfg::default`].

use std::sync::Arc;

use tempo_traits::{Actuator, Clock, ExpiryHandler, MonotonicClock, OneShotTimer, ResponseSink};

use crate::actuation::ActuationEngine;
use crate::config::DispatchCfg;
use crate::dispatcher::Dispatcher;
use crate::error::{BuildError, Result};
use crate::stats::RunningStats;

/// Constructs the timer once the expiry handle exists.
pub type TimerFactory = Box<dyn FnOnce(Arc<dyn ExpiryHandler>) -> Box<dyn OneShotTimer + Send>>;

#[derive(Default)]
pub struct DispatcherBuilder {
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    actuator: Option<Arc<dyn Actuator>>,
    timer: Option<TimerFactory>,
    sink: Option<Box<dyn ResponseSink + Send>>,
    stats: Option<Arc<RunningStats>>,
    cfg: Option<DispatchCfg>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }
}

impl DispatcherBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_actuator(mut self, actuator: Arc<dyn Actuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn with_timer<F>(mut self, make_timer: F) -> Self
    where
        F: FnOnce(Arc<dyn ExpiryHandler>) -> Box<dyn OneShotTimer + Send> + 'static,
    {
        self.timer = Some(Box::new(make_timer));
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ResponseSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing stats block (e.g. with a reporter outside the loop).
    pub fn with_stats(mut self, stats: Arc<RunningStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_config(mut self, cfg: DispatchCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn try_build(self) -> Result<Dispatcher> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let make_timer = self
            .timer
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTimer))?;
        let sink = self
            .sink
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSink))?;
        let cfg = self.cfg.unwrap_or_default();

        if cfg.tolerance_ms > 60_000 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tolerance_ms must be <= 60000",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let stats = self.stats.unwrap_or_default();
        let engine = ActuationEngine::new(Arc::clone(&clock), actuator, Arc::clone(&stats), make_timer);

        Ok(Dispatcher::from_parts(clock, engine, stats, sink, &cfg))
    }
}
