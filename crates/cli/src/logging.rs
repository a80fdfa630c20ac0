use switchboard_core::config::{AppConfig, LogFormat, LoadOptions};
use tracing::Level;

/// Sends router logs to stderr so command output on stdout stays parseable.
///
/// Falls back to `warn` when the configuration cannot be loaded; the command
/// itself reports the config error.
pub fn init() {
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level.parse().unwrap_or(Level::WARN), config.logging.format),
        Err(_) => (Level::WARN, LogFormat::Compact),
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
