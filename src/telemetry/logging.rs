//! Logging configuration and initialization
//!
//! Structured logging with tracing: compact console output for development,
//! JSON for log aggregation, and an optional log file in the same format.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "SURFACE_PLAYER_LOG";
/// Environment variable selecting the output format ("json")
pub const LOG_FORMAT_ENV: &str = "SURFACE_PLAYER_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Log file path (default: None, `surface-player.log` in the working directory)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console and file logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

/// Line format of one log output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

/// Which outputs are installed, and in which format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputPlan {
    console: Option<LogFormat>,
    file: Option<LogFormat>,
}

fn output_plan(config: &LogConfig, use_json: bool) -> OutputPlan {
    let format = if use_json { LogFormat::Json } else { LogFormat::Compact };
    OutputPlan {
        console: config.console_enabled.then_some(format),
        file: config.file_enabled.then_some(format),
    }
}

/// Initialize the global subscriber with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// so the file writer is flushed. The JSON format applies to the console and
/// the log file alike.
///
/// # Environment Variables
///
/// - `SURFACE_PLAYER_LOG`: log filter (e.g. "debug", "info,surface_player=trace"),
///   falls back to `RUST_LOG`
/// - `SURFACE_PLAYER_LOG_FORMAT`: set to "json" for JSON output
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(config.json_format);
    let plan = output_plan(config, use_json);

    let mut file_guard: Option<WorkerGuard> = None;
    let mut file_writer = None;
    let mut log_path = None;
    if plan.file.is_some() {
        let path = config
            .file_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("surface-player.log"));
        let file = std::fs::File::create(&path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);
        file_writer = Some(non_blocking);
        log_path = Some(path);
    }

    let file_plain = match (plan.file, file_writer.clone()) {
        (Some(LogFormat::Compact), Some(writer)) => Some(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false),
        ),
        _ => None,
    };
    let file_json = match (plan.file, file_writer) {
        (Some(LogFormat::Json), Some(writer)) => Some(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false),
        ),
        _ => None,
    };
    let console_plain = (plan.console == Some(LogFormat::Compact)).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
    });
    let console_json = (plan.console == Some(LogFormat::Json)).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_plain)
        .with(file_json)
        .with(console_plain)
        .with(console_json)
        .try_init()?;

    if let Some(path) = &log_path {
        eprintln!("Logging to file: {}", path.display());
    }

    tracing::info!(
        target: "surface_player",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}
