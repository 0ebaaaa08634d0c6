//! Logging configuration
//!
//! A [`LogConfig`] says where records go (console, rolling files), how they
//! are formatted, and how verbose each part of the forwarding engine is.
//! Engine parts are named by [`Component`] so a config file can say
//! `"matrix": "trace"` without spelling out module paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::LoggingError;

/// Part of the forwarding engine with its own log target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Decision loop, face roster, outcome routing
    Engine,
    /// Per-prefix state and table updates
    Entry,
    /// Probability tables and thresholds
    Matrix,
    /// Reliability statistics
    Statistics,
    /// Egress limiters and token buckets
    Limiter,
    /// Pipeline-facing strategies
    Strategy,
    /// Update timer task
    Scheduler,
}

impl Component {
    /// `tracing` target of the component's records
    pub fn target(self) -> &'static str {
        match self {
            Self::Engine => "saf_engine::engine",
            Self::Entry => "saf_engine::entry",
            Self::Matrix => "saf_engine::matrix",
            Self::Statistics => "saf_engine::statistics",
            Self::Limiter => "saf_engine::limiter",
            Self::Strategy => "saf_engine::strategy",
            Self::Scheduler => "saf_engine::scheduler",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// Main logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for everything not overridden below (RUST_LOG wins when set)
    pub default_level: String,

    pub console: ConsoleFormat,

    /// Rolling file output, JSONL formatted
    pub file: Option<FileConfig>,

    pub jsonl: JsonlConfig,

    /// Levels for engine components
    pub components: BTreeMap<Component, String>,

    /// Levels for arbitrary targets, e.g. a host router's own modules
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleFormat::default(),
            file: None,
            jsonl: JsonlConfig::default(),
            components: BTreeMap::new(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Pretty, colored console output at debug
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleFormat::Pretty { ansi: true },
            ..Default::default()
        }
    }

    /// Daily rotated JSONL files under `log_dir`, no console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileConfig {
                directory: log_dir,
                max_files: Some(30),
                ..FileConfig::default()
            }),
            ..Default::default()
        }
    }

    /// Warnings only, plain JSONL on the console
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// Development output with every forwarding decision and table update
    pub fn decision_trace() -> Self {
        let mut config = Self::development();
        config.components.insert(Component::Engine, "trace".to_string());
        config.components.insert(Component::Matrix, "trace".to_string());
        config.components.insert(Component::Limiter, "debug".to_string());
        config
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, LoggingError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Filter directives in `EnvFilter` syntax
    ///
    /// Component levels come before raw targets, so a target entry for the
    /// same module overrides its component.
    pub fn filter_directives(&self) -> String {
        let components = self
            .components
            .iter()
            .map(|(component, level)| (component.target(), level.as_str()));
        let targets = self
            .targets
            .iter()
            .map(|(target, level)| (target.as_str(), level.as_str()));

        let mut directives = self.default_level.clone();
        for (target, level) in components.chain(targets) {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// No console output
    Off,
    /// One JSON object per line on stdout
    #[default]
    Jsonl,
    /// Human-readable lines, optionally colored
    Pretty { ansi: bool },
}

impl ConsoleFormat {
    pub fn is_enabled(self) -> bool {
        self != Self::Off
    }
}

/// File output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name prefix; files are named `<prefix>.<date>.log`
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files to keep; `None` keeps all
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "saf".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(7),
        }
    }
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single `<prefix>.log`, truncated on startup
    Never,
}

/// How much span context each JSONL record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanDetail {
    None,
    /// The innermost span, e.g. the `decide` call a record came from
    Current,
    /// The innermost span and all of its parents
    #[default]
    Full,
}

/// JSONL formatting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Put event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    pub spans: SpanDetail,
    pub thread_info: bool,
    pub source_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            spans: SpanDetail::Full,
            thread_info: false,
            source_location: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, "info");
        assert_eq!(config.console, ConsoleFormat::Jsonl);
        assert!(config.file.is_none());
        assert_eq!(config.filter_directives(), "info");
    }

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.console, ConsoleFormat::Pretty { ansi: true });

        let prod = LogConfig::production(PathBuf::from("/var/log/saf"));
        assert!(!prod.console.is_enabled());
        let file = prod.file.unwrap();
        assert_eq!(file.prefix, "saf");
        assert_eq!(file.rotation, RotationStrategy::Daily);
        assert_eq!(file.max_files, Some(30));

        assert_eq!(LogConfig::testing().filter_directives(), "warn");
    }

    #[test]
    fn test_decision_trace_directives() {
        let config = LogConfig::decision_trace();
        assert_eq!(
            config.filter_directives(),
            "debug,saf_engine::engine=trace,saf_engine::matrix=trace,saf_engine::limiter=debug"
        );
    }

    #[test]
    fn test_targets_follow_components() {
        let mut config = LogConfig::testing();
        config.components.insert(Component::Scheduler, "info".into());
        config.targets.insert("saf_engine::scheduler".into(), "error".into());
        config.targets.insert("edge_router".into(), "debug".into());
        assert_eq!(
            config.filter_directives(),
            "warn,saf_engine::scheduler=info,edge_router=debug,saf_engine::scheduler=error"
        );
    }

    #[test]
    fn test_from_json_partial() {
        let config = LogConfig::from_json(
            r#"{
                "default_level": "debug",
                "console": { "pretty": { "ansi": false } },
                "components": { "matrix": "trace", "statistics": "debug" },
                "file": { "directory": "/tmp/saf", "prefix": "edge", "rotation": "hourly" },
                "jsonl": { "spans": "current" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.console, ConsoleFormat::Pretty { ansi: false });
        assert_eq!(config.components[&Component::Matrix], "trace");
        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.prefix, "edge");
        assert_eq!(file.max_files, Some(7));
        assert_eq!(config.jsonl.spans, SpanDetail::Current);
        assert!(config.jsonl.flatten_events);
    }

    #[test]
    fn test_from_json_rejects_unknown_component() {
        assert!(LogConfig::from_json(r#"{ "components": { "pit": "trace" } }"#).is_err());
        assert!(LogConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_console_off_from_json() {
        let config = LogConfig::from_json(r#"{ "console": "off" }"#).unwrap();
        assert!(!config.console.is_enabled());
    }
}
