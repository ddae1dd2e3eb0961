#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the timing tester.
//!
//! `Config` and its sections are deserialized from TOML and checked with
//! `Config::validate`. Only `[pins]` is required; every other section has
//! defaults suitable for the simulated backend.
use serde::Deserialize;

/// Largest number of samples a periodic series can hold.
pub const MAX_SERIES_SAMPLES: u16 = 1000;

#[derive(Debug, Deserialize)]
pub struct Pins {
    /// BCM pin driving the actuator (motor/solenoid driver input)
    pub actuator: u8,
    /// BCM pin driving the visual indicator LED
    pub indicator: u8,
    /// MCP3008 channel carrying the analog (audio) signal, if wired
    #[serde(default)]
    pub adc_channel: Option<u8>,
    /// BCM pin lit while a session is connected, if wired
    #[serde(default)]
    pub session_led: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Transport {
    /// UDP address the command channel listens on
    pub bind: String,
    /// A session without traffic for this long is considered disconnected
    pub idle_timeout_ms: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:47800".to_string(),
            idle_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Periodic {
    /// |deviation| at or below this counts as within tolerance (ms)
    pub tolerance_ms: u32,
}

impl Default for Periodic {
    fn default() -> Self {
        Self { tolerance_ms: 10 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Audio {
    /// Start the analog monitor at boot
    pub enabled: bool,
    /// Number of rising edges in one monitored series
    pub expected_count: u16,
    /// Nominal period of the sensed signal (ms)
    pub period_ms: u32,
    /// Level at or above which a LOW signal becomes HIGH
    pub high_threshold: u16,
    /// Level at or below which a HIGH signal becomes LOW
    pub low_threshold: u16,
    /// Minimum time between accepted transitions (ms)
    pub debounce_ms: u32,
    /// Interval between analog reads in the polling loop (ms)
    pub poll_ms: u64,
}

impl Default for Audio {
    fn default() -> Self {
        Self {
            enabled: false,
            expected_count: 100,
            period_ms: 1000,
            high_threshold: 2600,
            low_threshold: 1400,
            debounce_ms: 50,
            poll_ms: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Period of the running-stats log line while a session is active (0 disables)
    pub report_interval_ms: u64,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            report_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Rt {
    /// Request SCHED_FIFO, CPU pinning and mlockall at startup
    pub enabled: bool,
    /// SCHED_FIFO priority; defaults to the platform maximum
    pub priority: Option<i32>,
    /// CPU to pin to; defaults to 0
    pub cpu: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub periodic: Periodic,
    #[serde(default)]
    pub audio: Audio,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub rt: Rt,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        if self.pins.actuator == self.pins.indicator {
            eyre::bail!("pins.actuator and pins.indicator must differ");
        }
        if let Some(led) = self.pins.session_led
            && (led == self.pins.actuator || led == self.pins.indicator)
        {
            eyre::bail!("pins.session_led must differ from pins.actuator and pins.indicator");
        }
        if let Some(ch) = self.pins.adc_channel
            && ch > 7
        {
            eyre::bail!("pins.adc_channel must be in 0..=7");
        }

        // Transport
        if self.transport.bind.parse::<std::net::SocketAddr>().is_err() {
            eyre::bail!(
                "transport.bind is not a socket address: {:?}",
                self.transport.bind
            );
        }
        if self.transport.idle_timeout_ms == 0 {
            eyre::bail!("transport.idle_timeout_ms must be >= 1");
        }

        // Periodic
        if self.periodic.tolerance_ms > 60_000 {
            eyre::bail!("periodic.tolerance_ms is unreasonably large (>60s)");
        }

        // Audio
        if self.audio.high_threshold <= self.audio.low_threshold {
            eyre::bail!("audio.high_threshold must be > audio.low_threshold");
        }
        if self.audio.period_ms == 0 {
            eyre::bail!("audio.period_ms must be > 0");
        }
        if self.audio.expected_count > MAX_SERIES_SAMPLES {
            eyre::bail!("audio.expected_count must be <= {MAX_SERIES_SAMPLES}");
        }
        if self.audio.debounce_ms > 10_000 {
            eyre::bail!("audio.debounce_ms is unreasonably large (>10s)");
        }
        if !(1..=1_000).contains(&self.audio.poll_ms) {
            eyre::bail!("audio.poll_ms must be in [1, 1000]");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly, got {rot:?}");
        }

        // Rt
        if let Some(p) = self.rt.priority
            && !(1..=99).contains(&p)
        {
            eyre::bail!("rt.priority must be in [1, 99]");
        }

        Ok(())
    }
}
