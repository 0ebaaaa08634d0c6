//! Structured logging for SAF forwarding engines
//!
//! Builds the global `tracing` subscriber used by routers embedding the
//! engine: JSONL output by default, human-readable output for development,
//! optional rolling file output, and router context injection so that logs
//! from several engines in one process stay attributable.
//!
//! # Quick Start
//!
//! ```no_run
//! use saf_logging::{LogConfig, SafSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = SafSubscriberBuilder::new().init();
//!
//! // Or pretty human-readable output
//! let _guard = SafSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{
    Component, ConsoleFormat, FileConfig, JsonlConfig, LogConfig, RotationStrategy, SpanDetail,
};
pub use context::{RouterContextData, RouterContextGuard};
pub use layers::{RouterContextExtension, RouterContextLayer};

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create rolling log appender: {0}")]
    Appender(#[from] InitError),

    #[error("invalid filter directives: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("invalid logging configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Builder for the global logging subscriber
///
/// By default console output is JSONL. Use [`LogConfig::development`] for
/// human-readable output.
pub struct SafSubscriberBuilder {
    config: LogConfig,
}

impl SafSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Override the level for one engine component
    pub fn with_component_level(mut self, component: Component, level: impl Into<String>) -> Self {
        self.config.components.insert(component, level.into());
        self
    }

    /// Override the level for one target
    pub fn with_target_level(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.config.targets.insert(target.into(), level.into());
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally
    ///
    /// Setup failures are reported on stderr and leave logging disabled.
    /// The returned guard must be kept alive while file output is in use.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Initialize the subscriber globally
    ///
    /// Fails if a global subscriber is already set, the filter directives do
    /// not parse, or the log file cannot be created.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(self.config.filter_directives())?,
        };

        let (file_writer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = create_file_writer(file_config)?;
                (Some(writer), Some(guard))
            }
            None => (None, None),
        };

        let pretty_console = match self.config.console {
            ConsoleFormat::Pretty { ansi } => {
                Some(tracing_subscriber::fmt::layer().with_ansi(ansi).with_target(true))
            }
            _ => None,
        };
        let jsonl_console = (self.config.console == ConsoleFormat::Jsonl)
            .then(|| layers::jsonl_layer(&self.config.jsonl, std::io::stdout));
        let file_layer = file_writer.map(|writer| layers::jsonl_layer(&self.config.jsonl, writer));

        Registry::default()
            .with(env_filter)
            .with(RouterContextLayer::new())
            .with(pretty_console)
            .with(jsonl_console)
            .with(file_layer)
            .try_init()?;

        Ok(guard)
    }
}

impl Default for SafSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the non-blocking writer for file output
///
/// `Never` truncates a single `<prefix>.log`; the rotating strategies append
/// to dated files.
pub fn create_file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = fs::create_dir_all(&config.directory)
                .and_then(|_| File::create(&path))
                .map_err(|source| LoggingError::LogFile { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to console
pub fn init_default() -> Option<WorkerGuard> {
    SafSubscriberBuilder::new().init()
}

/// Verbose, pretty console output
pub fn init_development() -> Option<WorkerGuard> {
    SafSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Minimal output; safe to call from every test
pub fn init_testing() {
    let _ = SafSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use uuid::Uuid;

    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("saf-logging-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_builder_creation() {
        let builder = SafSubscriberBuilder::new();
        assert_eq!(builder.config().default_level, "info");
        assert_eq!(builder.config().console, ConsoleFormat::Jsonl);
    }

    #[test]
    fn test_builder_with_config() {
        let builder = SafSubscriberBuilder::new().with_config(LogConfig::development());
        assert_eq!(builder.config().default_level, "debug");
        assert!(matches!(builder.config().console, ConsoleFormat::Pretty { .. }));
    }

    #[test]
    fn test_builder_overrides() {
        let builder = SafSubscriberBuilder::new()
            .with_level("trace")
            .with_console(ConsoleFormat::Off)
            .with_component_level(Component::Limiter, "debug")
            .with_target_level("saf_engine", "warn");
        assert_eq!(builder.config().default_level, "trace");
        assert!(!builder.config().console.is_enabled());
        assert_eq!(
            builder.config().filter_directives(),
            "trace,saf_engine::limiter=debug,saf_engine=warn"
        );
    }

    #[test]
    fn test_single_file_writer_truncates() {
        let directory = scratch_dir();
        let config = FileConfig {
            directory: directory.clone(),
            prefix: "router".into(),
            rotation: RotationStrategy::Never,
            max_files: None,
        };

        let path = directory.join("router.log");
        {
            let (mut writer, _guard) = create_file_writer(&config).unwrap();
            writer.write_all(b"first run\n").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "first run\n");

        {
            let (_writer, _guard) = create_file_writer(&config).unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        let _ = fs::remove_dir_all(directory);
    }

    #[test]
    fn test_rolling_writer_creates_directory() {
        let directory = scratch_dir();
        let config = FileConfig {
            directory: directory.clone(),
            rotation: RotationStrategy::Hourly,
            ..FileConfig::default()
        };

        let (_writer, _guard) = create_file_writer(&config).unwrap();
        assert!(directory.is_dir());

        let _ = fs::remove_dir_all(directory);
    }

    #[test]
    fn test_unwritable_log_file_is_an_error() {
        let directory = scratch_dir();
        fs::create_dir_all(&directory).unwrap();
        // A directory where the log file should go
        fs::create_dir_all(directory.join("busy.log")).unwrap();

        let config = FileConfig {
            directory: directory.clone(),
            prefix: "busy".into(),
            rotation: RotationStrategy::Never,
            max_files: None,
        };
        assert!(matches!(
            create_file_writer(&config),
            Err(LoggingError::LogFile { .. })
        ));

        let _ = fs::remove_dir_all(directory);
    }

    #[test]
    fn test_init_testing_is_idempotent() {
        init_testing();
        init_testing();
        assert!(SafSubscriberBuilder::new().try_init().is_err());
    }
}
