// Logging setup for petrel.
//
// Built on the `tracing` ecosystem. The pool itself only emits events
// (worker lifecycle at DEBUG, factory failures at WARN, hook panics at
// ERROR); installing a subscriber is the embedding application's choice,
// and these helpers cover the common cases.
//
// # Usage
//
// ```rust
// petrel::logging::init_default();
//
// // Or with custom settings:
// let config = petrel::logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     ..Default::default()
// };
// petrel::logging::init(config);
// ```
//
// `RUST_LOG` takes precedence over the configured level when set.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to emit when `RUST_LOG` is unset.
    pub level: Level,

    /// Emit JSON records instead of human-readable lines.
    pub json_format: bool,

    /// Include the file and line of each call site.
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            file_line: false,
        }
    }
}

/// Initializes the global subscriber with the given configuration.
///
/// Does nothing if a subscriber is already installed, so libraries and
/// tests can call it unconditionally.
pub fn init(config: LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.file_line)
        .with_line_number(config.file_line);
    if config.json_format {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Initializes logging with default settings (INFO, console output).
pub fn init_default() {
    init(LogConfig::default());
}

/// Development-friendly settings: DEBUG level with call-site locations.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        json_format: false,
        file_line: true,
    });
}

/// Production-oriented settings: INFO level, JSON records, no call sites.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        file_line: false,
    });
}
