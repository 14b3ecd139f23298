//! Logging setup.
//!
//! Console output is compact text, or JSON when `MOVCONVERT_LOG_FORMAT=json`.
//! Setting `MOVCONVERT_LOG_FILE` additionally writes plain text to that file
//! through a non-blocking appender.

use std::fs::{self, File};
use std::path::PathBuf;

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Where and how log lines are written.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub console_enabled: bool,
    pub json_format: bool,
    /// Also write to this file
    pub file_path: Option<PathBuf>,
    /// Filter used when neither `MOVCONVERT_LOG` nor `RUST_LOG` is set
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            json_format: false,
            file_path: None,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("MOVCONVERT_LOG_FORMAT").ok().as_deref(),
            std::env::var_os("MOVCONVERT_LOG_FILE").map(PathBuf::from),
        )
    }

    fn from_values(format: Option<&str>, file: Option<PathBuf>) -> Self {
        Self {
            json_format: format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json")),
            file_path: file.filter(|p| !p.as_os_str().is_empty()),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env("MOVCONVERT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit, otherwise buffered file output
/// is lost.
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, InitError> {
    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let (writer, guard) = tracing_appender::non_blocking(File::create(path)?);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_layer = (config.console_enabled && config.json_format).then(|| {
        fmt::layer()
            .json()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });
    let text_layer = (config.console_enabled && !config.json_format)
        .then(|| fmt::layer().with_target(true).compact());

    tracing_subscriber::registry()
        .with(config.filter())
        .with(file_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    tracing::info!(
        target: "mov_converter",
        version = env!("CARGO_PKG_VERSION"),
        json_format = config.json_format,
        log_file = ?config.file_path,
        "Logging initialized"
    );

    Ok(guard)
}
