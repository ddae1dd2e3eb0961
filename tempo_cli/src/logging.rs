//! Console and file logging.
//!
//! The console layer writes to stderr so stdout stays free for results.
//! Its filter comes from `RUST_LOG` or `--log-level`. The optional file
//! layer writes JSON lines with its own level from `[logging]`.

use std::path::Path;

use tempo_config::Logging;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::cli::FILE_GUARD;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn init_logging(json: bool, level: &str, cfg: &Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| eyre::eyre!("invalid log level {level:?}: {e}"))?;

    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let mut layers = vec![console];
    if let Some(path) = cfg.file.as_deref() {
        layers.push(file_layer(Path::new(path), cfg)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("logging already initialized: {e}"))
}

fn file_layer(path: &Path, cfg: &Logging) -> eyre::Result<BoxedLayer> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;

    let appender = match cfg.rotation.as_deref().unwrap_or("never") {
        "daily" => tracing_appender::rolling::daily(dir, name),
        "hourly" => tracing_appender::rolling::hourly(dir, name),
        _ => tracing_appender::rolling::never(dir, name),
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // Keeps the writer thread alive (and flushing) until exit.
    let _ = FILE_GUARD.set(guard);

    let filter = EnvFilter::try_new(cfg.level.as_deref().unwrap_or("info"))?;
    Ok(fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter)
        .boxed())
}
