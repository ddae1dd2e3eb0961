#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Actuation-timing engine (transport- and hardware-agnostic).
//!
//! All hardware goes through `tempo_traits`: [`Clock`], [`Actuator`],
//! [`AnalogInput`], [`OneShotTimer`] and [`ResponseSink`].
//!
//! ## Architecture
//!
//! - **Protocol**: binary command/response frames (`protocol`)
//! - **Dispatch**: transport events in, responses out (`dispatcher`)
//! - **Time sync**: three-timestamp exchange (`time_sync`)
//! - **Actuation**: immediate or timer-deferred pulses with an atomic
//!   handoff out of the expiry context (`actuation`)
//! - **Periodic analysis**: baseline-anchored deviations (`periodic`)
//! - **Signal monitor**: debounced edges from an analog level (`edge`, `monitor`)
//! - **Stats / export**: running error stats, binary results, summaries (`stats`, `export`)
//!
//! ## Execution contexts
//!
//! Everything runs in the caller's (normal) context except
//! [`ExpiryHandler::on_expiry`], which the timer may invoke from a
//! restricted context. The only implementation, `actuation::ExpiryContext`,
//! touches atomics, the clock and the actuator, nothing else.
//!
//! [`Clock`]: tempo_traits::Clock
//! [`Actuator`]: tempo_traits::Actuator
//! [`AnalogInput`]: tempo_traits::AnalogInput
//! [`OneShotTimer`]: tempo_traits::OneShotTimer
//! [`ResponseSink`]: tempo_traits::ResponseSink
//! [`ExpiryHandler::on_expiry`]: tempo_traits::ExpiryHandler::on_expiry

pub mod actuation;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod dispatcher;
pub mod edge;
pub mod error;
pub mod export;
pub mod mocks;
pub mod monitor;
pub mod periodic;
pub mod protocol;
pub mod stats;
pub mod time_sync;
pub mod util;

pub use actuation::{ActuationEngine, ActuationOutcome, Completion, PendingActuation};
pub use builder::DispatcherBuilder;
pub use config::{DispatchCfg, MonitorCfg};
pub use dispatcher::{Dispatcher, TransportEvent};
pub use edge::{Edge, EdgeDetector, EdgeThresholds};
pub use error::{BuildError, FrameError, Result, TempoError};
pub use export::{SeriesSummary, SignalReport, export_binary, export_summary, query_record};
pub use monitor::SignalMonitor;
pub use periodic::{PeriodicSeries, RecordRejected, SERIES_CAPACITY, Sample};
pub use protocol::{ActuateRequest, Command, Opcode, Response};
pub use stats::{RunningStats, StatsSnapshot, TOLERANCE_MS};
pub use time_sync::{TimeSyncReply, TimeSyncResponder};
