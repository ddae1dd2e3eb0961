mod cli;
mod csv_export;
mod error_fmt;
mod logging;
mod rt;
mod selfcheck;
mod service;
mod transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tempo_config::Config;
use tempo_core::{DispatchCfg, Dispatcher, MonitorCfg, SignalMonitor};
use tempo_hardware::ThreadTimer;
use tempo_traits::{Actuator, Clock, MonotonicClock};

use crate::cli::{Cli, Commands, JSON_MODE, RtLock};
use crate::error_fmt::{CliError, exit_code_for_error, format_error_json, humanize};
use crate::rt::{RtRequest, setup_rt_once};
use crate::selfcheck::SelfCheckReport;
use crate::service::{DynAnalog, Service, ServiceReport};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli.config)?;
    logging::init_logging(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Serve {
            bind,
            export_csv,
            duration_ms,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            setup_rt_once(RtRequest {
                enabled: rt || cfg.rt.enabled,
                priority: rt_prio.or(cfg.rt.priority),
                lock: rt_lock.unwrap_or(RtLock::os_default()),
                cpu: rt_cpu.or(cfg.rt.cpu),
            });
            let report = serve(&cfg, bind, export_csv, duration_ms)?;
            print_service_report(&report, cli.json);
        }
        Commands::SelfCheck => {
            let report = selfcheck::run_self_check(cfg.periodic.tolerance_ms)?;
            print_self_check(&report, cli.json);
            report.into_result()?;
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("{}: {e}", path.display())))?;
    let cfg = tempo_config::load_toml(&text).map_err(|e| CliError::Config(e.to_string()))?;
    cfg.validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(cfg)
}

fn serve(
    cfg: &Config,
    bind: Option<String>,
    export_csv: Option<PathBuf>,
    duration_ms: Option<u64>,
) -> eyre::Result<ServiceReport> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .map_err(|e| eyre::eyre!("installing Ctrl-C handler: {e}"))?;
    }

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let bind = bind.unwrap_or_else(|| cfg.transport.bind.clone());
    let transport = transport::UdpTransport::bind(
        &bind,
        cfg.transport.idle_timeout_ms,
        Duration::from_millis(cfg.audio.poll_ms),
    )?;

    let (actuator, analog) = backend(cfg, &clock)?;
    let dispatcher = Dispatcher::builder()
        .with_clock(Arc::clone(&clock))
        .with_actuator(actuator)
        .with_timer(ThreadTimer::factory())
        .with_sink(Box::new(transport.sink()?))
        .with_config(DispatchCfg::from(cfg))
        .try_build()?;
    let monitor = match analog {
        Some(input) => Some(SignalMonitor::new(input, &MonitorCfg::from(cfg))?),
        None => None,
    };

    let mut service = Service::new(clock, dispatcher, transport, monitor, export_csv);
    Ok(service.run(&shutdown, duration_ms))
}

/// GPIO actuator, plus the MCP3008 when audio monitoring is on.
#[cfg(all(feature = "hardware", target_os = "linux"))]
fn backend(
    cfg: &Config,
    _clock: &Arc<dyn Clock + Send + Sync>,
) -> eyre::Result<(Arc<dyn Actuator>, Option<DynAnalog>)> {
    let actuator: Arc<dyn Actuator> = Arc::new(tempo_hardware::GpioActuator::new(
        cfg.pins.actuator,
        cfg.pins.indicator,
        cfg.pins.session_led,
    )?);
    let analog: Option<DynAnalog> = match (cfg.audio.enabled, cfg.pins.adc_channel) {
        (true, Some(ch)) => Some(Box::new(tempo_hardware::Mcp3008::new(ch)?)),
        (true, None) => {
            tracing::warn!("audio.enabled is set but pins.adc_channel is not; monitor disabled");
            None
        }
        (false, _) => None,
    };
    Ok((actuator, analog))
}

/// Simulated actuator, plus a square wave at the configured period when
/// audio monitoring is on.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn backend(
    cfg: &Config,
    clock: &Arc<dyn Clock + Send + Sync>,
) -> eyre::Result<(Arc<dyn Actuator>, Option<DynAnalog>)> {
    let actuator: Arc<dyn Actuator> = Arc::new(tempo_hardware::SimulatedActuator::new());
    let audio = &cfg.audio;
    let analog: Option<DynAnalog> = audio.enabled.then(|| {
        let wave = tempo_hardware::SimulatedAnalog::new(
            Arc::clone(clock),
            audio.period_ms,
            audio.period_ms / 2,
            audio.high_threshold.saturating_add(400),
            audio.low_threshold / 2,
        )
        .with_noise(50);
        Box::new(wave) as DynAnalog
    });
    tracing::info!(monitor = analog.is_some(), "simulated backend");
    Ok((actuator, analog))
}

fn print_service_report(report: &ServiceReport, json: bool) {
    if json {
        let out = json!({
            "uptime_ms": report.uptime_ms,
            "stats": report.stats,
            "series": report.series,
            "csv_exports": report.csv_exports,
            "signal": report.signal,
        });
        println!("{out}");
        return;
    }
    let s = &report.stats;
    println!("uptime: {} ms", report.uptime_ms);
    println!(
        "actuations: {} ({} within tolerance, {:.1}%), avg error {:.2} ms, max {} ms, stale expiries {}",
        s.total_commands,
        s.commands_within_tolerance,
        s.within_tolerance_pct(),
        s.mean_error_ms().unwrap_or(0.0),
        s.max_error_ms,
        s.stale_expiries
    );
    println!(
        "series: {} samples, avg deviation {:.2} ms, max |deviation| {} ms, {:.1}% within {} ms",
        report.series.sample_count,
        report.series.average_deviation_ms,
        report.series.max_abs_deviation_ms,
        report.series.within_tolerance_pct,
        report.series.tolerance_ms
    );
    if let Some(sig) = &report.signal {
        println!(
            "signal: {} edges, monitoring {}",
            sig.signal_count,
            if sig.monitoring_enabled { "on" } else { "off" }
        );
    }
}

fn print_self_check(report: &SelfCheckReport, json: bool) {
    let verdict = if report.passed() { "passed" } else { "failed" };
    if json {
        let steps: Vec<_> = report
            .steps
            .iter()
            .map(|s| json!({ "name": s.name, "ok": s.ok, "detail": s.detail }))
            .collect();
        let out = json!({
            "self_check": verdict,
            "steps": steps,
            "stats": report.stats,
            "deviations": report.deviations,
        });
        println!("{out}");
        return;
    }
    for s in &report.steps {
        let mark = if s.ok { "ok  " } else { "FAIL" };
        println!("[{mark}] {}: {}", s.name, s.detail);
    }
    println!("self-check {verdict}");
}
