use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SCHEDULER_NAME: &str = "dueq";
pub const DEFAULT_MAX_PARK_MS: u64 = 60_000; // re-check the clock at least once a minute
pub const DEFAULT_LOG_FILTER: &str = "dueq=info";
pub const ENV_PREFIX: &str = "DUEQ_";

/// Top-level config (dueq.toml + DUEQ_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DueqConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning for a single scheduler instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Label attached to every log event emitted by this instance.
    #[serde(default = "default_name")]
    pub name: String,
    /// Longest single park of the dispatcher, in milliseconds. 0 disables the cap.
    /// Bounds how long a forward jump of the system clock can go unnoticed.
    #[serde(default = "default_max_park_ms")]
    pub max_park_ms: u64,
    /// Run computations on the runtime's blocking pool instead of inline on the
    /// executor task. Computations still run one at a time either way.
    #[serde(default = "bool_true")]
    pub blocking_pool: bool,
    #[serde(default)]
    pub clock: ClockKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_park_ms: DEFAULT_MAX_PARK_MS,
            blocking_pool: true,
            clock: ClockKind::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn max_park(&self) -> Option<Duration> {
        (self.max_park_ms > 0).then(|| Duration::from_millis(self.max_park_ms))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockKind {
    /// Wall clock anchored once, then advanced monotonically.
    #[default]
    Monotonic,
    /// Raw system wall clock.
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_name() -> String {
    DEFAULT_SCHEDULER_NAME.to_string()
}
fn default_max_park_ms() -> u64 {
    DEFAULT_MAX_PARK_MS
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
fn bool_true() -> bool {
    true
}

impl DueqConfig {
    /// Load config from a TOML file (missing file means defaults), then apply
    /// `DUEQ_` env overrides. Nested keys use `__`: `DUEQ_SCHEDULER__MAX_PARK_MS=500`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("dueq.toml");
        let config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse config from an in-memory TOML document, without env overrides.
    pub fn from_toml_str(toml: &str) -> crate::error::Result<Self> {
        let config = Figment::new().merge(Toml::string(toml)).extract()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = DueqConfig::from_toml_str("").unwrap();
        assert_eq!(config.scheduler.name, "dueq");
        assert_eq!(config.scheduler.max_park_ms, DEFAULT_MAX_PARK_MS);
        assert!(config.scheduler.blocking_pool);
        assert_eq!(config.scheduler.clock, ClockKind::Monotonic);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn overrides_are_applied() {
        let config = DueqConfig::from_toml_str(
            r#"
            [scheduler]
            name = "billing"
            max_park_ms = 0
            blocking_pool = false
            clock = "system"

            [logging]
            filter = "dueq=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.name, "billing");
        assert_eq!(config.scheduler.max_park(), None);
        assert!(!config.scheduler.blocking_pool);
        assert_eq!(config.scheduler.clock, ClockKind::System);
        assert_eq!(config.logging.filter, "dueq=debug");
    }

    #[test]
    fn unknown_clock_is_rejected() {
        let err = DueqConfig::from_toml_str("[scheduler]\nclock = \"sundial\"").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn max_park_converts_to_duration() {
        let config = SchedulerConfig {
            max_park_ms: 250,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.max_park(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = DueqConfig::load(Some("/nonexistent/dueq.toml")).unwrap();
        assert!(!config.scheduler.name.is_empty());
    }
}
