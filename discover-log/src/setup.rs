use std::backtrace::Backtrace;
use std::{env, panic};

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Crates whose log output is controlled by the configured [`Level`].
///
/// All other crates are logged at `INFO`.
const CRATE_NAMES: &[&str] = &[
    "discover",
    "discover_config",
    "discover_fields",
    "discover_log",
];

/// The maximum verbosity of log messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Only errors.
    Error,
    /// Warnings and errors.
    Warn,
    /// Messages relevant to the average user.
    #[default]
    Info,
    /// Messages relevant for debugging, such as collaborator lookups.
    Debug,
    /// Every resolved field and function.
    Trace,
    /// Disables logging entirely.
    Off,
}

impl Level {
    /// Returns the tracing [`LevelFilter`] for this level.
    pub const fn level_filter(&self) -> LevelFilter {
        match self {
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Off => LevelFilter::OFF,
        }
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO discover::cli: resolved 3 fields
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32.123Z  INFO discover::cli: resolved 3 fields
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"resolved 3 fields"},"target":"discover::cli"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for all Discover crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, panics are logged with a backtrace.
    ///
    /// Otherwise, the default panic handler prints backtraces according to `RUST_BACKTRACE`.
    pub enable_backtraces: bool,
}

/// Builds the log filter.
///
/// Our own crates log at the configured level and all others at `INFO`. A set `RUST_LOG`
/// variable replaces these directives.
fn log_filter(level: Level) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());

    if env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return builder.from_env_lossy();
    }

    let directives = CRATE_NAMES
        .iter()
        .map(|name| format!("{name}={}", level.level_filter()))
        .collect::<Vec<_>>()
        .join(",");

    builder.parse_lossy(directives)
}

/// Logs panics with a forced backtrace.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("{info}\n{backtrace}");
    }));
}

/// Initialize the logging system.
///
/// If the `RUST_LOG` environment variable is set, it takes precedence over the configured level.
///
/// # Example
///
/// ```
/// let log_config = discover_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// discover_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        install_panic_hook();
    }

    let filter = log_filter(config.level);

    let format = match (config.format, console::user_attended_stderr()) {
        (LogFormat::Auto, true) => LogFormat::Pretty,
        (LogFormat::Auto, false) => LogFormat::Simplified,
        (format, _) => format,
    };

    let subscriber = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let format_layer = match format {
        LogFormat::Json => subscriber.json().flatten_event(true).boxed(),
        LogFormat::Simplified => subscriber.with_ansi(false).boxed(),
        LogFormat::Pretty | LogFormat::Auto => subscriber.with_ansi(true).compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(format_layer)
        .with(filter)
        .try_init()
        .ok();
}
