//! Human-readable error descriptions, exit codes and JSON error output.

/// Failures raised by the CLI itself.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Config file unreadable, unparsable or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The UDP socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// One or more self-check steps failed.
    #[error("self-check failed: {}", .0.join("; "))]
    SelfCheck(Vec<String>),
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use tempo_core::error::{BuildError, TempoError};
    use tempo_hardware::HwError;

    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing [pins] section, a typo in a key, or an out-of-range value.\nHow to fix: Edit the config file (see etc/tempo.toml for a sample), then rerun."
            ),
            CliError::Bind { addr, source } => format!(
                "What happened: Could not listen on {addr} ({source}).\nLikely causes: Another tester instance is running, the port is privileged, or the address is not local.\nHow to fix: Stop the other instance or choose a different [transport].bind / --bind."
            ),
            CliError::SelfCheck(failed) => format!(
                "What happened: Self-check failed ({}).\nLikely causes: A heavily loaded host delaying the timer thread, or a regression in the engine.\nHow to fix: Re-run on an idle machine with --log-level=debug and inspect the failing step.",
                failed.join("; ")
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator was provided to the dispatcher.\nLikely causes: GPIO output failed to initialize or was not wired into the builder.\nHow to fix: Check [pins].actuator and [pins].indicator and GPIO permissions.".to_string()
            }
            BuildError::MissingTimer => {
                "What happened: No one-shot timer was provided to the dispatcher.\nLikely causes: The timer backend was not wired into the builder.\nHow to fix: Pass a timer factory via with_timer(...).".to_string()
            }
            BuildError::MissingSink => {
                "What happened: No response sink was provided to the dispatcher.\nLikely causes: The transport was not wired into the builder.\nHow to fix: Pass the transport sink via with_sink(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return match he {
            HwError::Gpio(msg) => format!(
                "What happened: GPIO setup failed ({msg}).\nLikely causes: Wrong pin numbers, pins in use, or no access to /dev/gpiomem.\nHow to fix: Fix [pins] in the config and run as a user in the gpio group."
            ),
            HwError::Spi(msg) => format!(
                "What happened: SPI setup failed ({msg}).\nLikely causes: SPI disabled in the boot config or no access to /dev/spidev0.0.\nHow to fix: Enable SPI (raspi-config) and check permissions."
            ),
            HwError::AdcChannel(ch) => format!(
                "What happened: ADC channel {ch} does not exist.\nLikely causes: [pins].adc_channel outside 0..=7.\nHow to fix: Use the MCP3008 channel the signal is wired to."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug for more detail."
            ),
        };
    }

    if let Some(te) = err.downcast_ref::<TempoError>() {
        return format!(
            "What happened: {te}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
        );
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();
    if lower.contains("no such file") || lower.contains("not found") {
        return format!(
            "What happened: A required file could not be opened.\nLikely causes: Wrong --config path or working directory.\nHow to fix: Pass --config <FILE> pointing at an existing TOML file. Original: {msg}"
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per failure class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(_) => 3,
            CliError::Bind { .. } => 4,
            CliError::SelfCheck(_) => 6,
        };
    }
    if err.downcast_ref::<tempo_core::error::BuildError>().is_some() {
        return 3;
    }
    if err.downcast_ref::<tempo_hardware::HwError>().is_some() {
        return 5;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    use tempo_core::error::BuildError;
    if let Some(ce) = err.downcast_ref::<CliError>() {
        return match ce {
            CliError::Config(_) => "Config",
            CliError::Bind { .. } => "Bind",
            CliError::SelfCheck(_) => "SelfCheck",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if err.downcast_ref::<tempo_hardware::HwError>().is_some() {
        return "Hardware";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    });
    if let Some(CliError::SelfCheck(failed)) = err.downcast_ref::<CliError>() {
        obj["failed_steps"] = json!(failed);
    }
    obj.to_string()
}
