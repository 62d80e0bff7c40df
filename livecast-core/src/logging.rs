use tracing::Level;
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Initialize structured logging based on configuration
///
/// `RUST_LOG` replaces the configured level; the configured per-target
/// directives (e.g. `livecast_publisher=debug`) are applied on top of either.
/// Output goes to stdout unless a file path is configured.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_env_filter(config)?;
    let writer = match &config.file_path {
        Some(path) => BoxMakeWriter::new(open_log_file(path)?),
        None => BoxMakeWriter::new(std::io::stdout),
    };
    let ansi = config.file_path.is_none();
    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer),
            )
            .try_init()?,
        "pretty" => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(ansi)
                    .with_target(true)
                    .with_file(false)
                    .with_writer(writer),
            )
            .try_init()?,
        other => anyhow::bail!("Invalid log format: {other}"),
    }

    Ok(())
}

fn build_env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let level = parse_log_level(&config.level)?;
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    for directive in &config.directives {
        let directive: Directive = directive
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid log directive {directive:?}: {e}"))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn open_log_file(path: &str) -> anyhow::Result<std::sync::Arc<std::fs::File>> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(std::sync::Arc::new(file))
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
