//! Structured logging setup for rpkg
//!
//! Logs go to stderr so that command results on stdout stay machine-readable.
//!
//! # Environment Variables
//!
//! - `RPKG_LOG_LEVEL`: trace|debug|info|warn|error - default: "info"
//! - `RPKG_LOG_JSON`: emit JSON lines instead of human-readable output - default: "false"
//! - `RUST_LOG`: standard filter directives, replaces the defaults when set
//!
//! # Example
//!
//! ```no_run
//! use rpkg::util::logging;
//!
//! logging::init_from_env();
//!
//! tracing::info!(file = "hello-1.0.tar.gz", "Downloading");
//! ```

use std::env;
use std::io;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for rpkg's own events
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    /// Include the module target (e.g., rpkg::lookaside) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Reads `RPKG_LOG_LEVEL` and `RPKG_LOG_JSON`
    pub fn from_env() -> Self {
        let level_str = env::var("RPKG_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let use_json = env::var("RPKG_LOG_JSON")
            .ok()
            .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level: parse_level(&level_str),
            use_json,
            ..Default::default()
        }
    }

    /// Command-line flags take precedence over the environment: an explicit level first,
    /// then `--verbose` (debug), then `--quiet` (error).
    pub fn with_overrides(mut self, log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        if let Some(level) = log_level {
            self.level = parse_level(level);
        } else if verbose {
            self.level = Level::DEBUG;
        } else if quiet {
            self.level = Level::ERROR;
        }
        if verbose {
            self.include_location = true;
        }
        self
    }
}

/// Parses a log level, falling back to INFO with a warning on stderr
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }

    let directives = ["warn".to_string(), format!("rpkg={}", level)];
    directives
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::new(""), EnvFilter::add_directive)
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        }
    });
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}
