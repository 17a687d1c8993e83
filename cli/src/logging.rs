//! Tracing setup: level from config, pretty or JSON output, optional file
//! target via a non-blocking appender.

use config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber. Returns the appender guard, which must
/// live as long as the process when logging to a file.
pub fn init(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match &config.output {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "quill.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            match config.format {
                LogFormat::Json => {
                    tracing_subscriber::fmt()
                        .json()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::fmt()
                        .with_env_filter(filter)
                        .with_writer(writer)
                        .with_ansi(false)
                        .init();
                }
            }
            Some(guard)
        }
        None => {
            match config.format {
                LogFormat::Json => {
                    tracing_subscriber::fmt().json().with_env_filter(filter).init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::fmt().with_env_filter(filter).init();
                }
            }
            None
        }
    }
}
