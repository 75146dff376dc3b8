//! Dispatcher configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables, then (in the binary) by command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taktgeber_wire::Transport;

use crate::error::CronError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Directory service, `host:port` or `tcp://host:port`.
    #[serde(default = "default_directory_address")]
    pub directory_address: String,

    /// Initial execution service address. Normally learned from the
    /// `registry` feed; until then the execution link stays idle.
    #[serde(default)]
    pub execution_address: Option<String>,

    /// Pause between failed connection attempts, in milliseconds.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Lower the default level to `debug`. `RUST_LOG` still wins.
    #[serde(default)]
    pub debug: bool,

    /// One JSON object per line on stdout; plain text otherwise.
    #[serde(default = "default_true")]
    pub json: bool,

    /// Also ship every event to a GELF UDP endpoint.
    #[serde(default)]
    pub graylog: Option<GraylogConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraylogConfig {
    pub host: String,

    #[serde(default = "default_graylog_port")]
    pub port: u16,

    /// Reported as `_source-app` on every message.
    #[serde(default = "default_graylog_source")]
    pub source: String,
}

fn default_directory_address() -> String {
    "tcp://localhost:1234".into()
}

fn default_reconnect_backoff_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_graylog_port() -> u16 {
    12201
}

fn default_graylog_source() -> String {
    "taktgeber".into()
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            directory_address: default_directory_address(),
            execution_address: None,
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            json: true,
            graylog: None,
        }
    }
}

impl DispatcherConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, CronError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CronError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, CronError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides. Empty values are ignored.
    ///
    /// - `TAKTGEBER_DIRECTORY` → `directory_address`
    /// - `TAKTGEBER_EXECUTION` → `execution_address`
    /// - `TAKTGEBER_RECONNECT_BACKOFF_MS` → `reconnect_backoff_ms`
    /// - `TAKTGEBER_DEBUG` (any value) → `logging.debug`
    /// - `GRAYLOG2_HOST` / `GRAYLOG2_PORT` / `GRAYLOG2_SOURCE` → `logging.graylog`
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TAKTGEBER_DIRECTORY") {
            self.directory_address = v;
        }
        if let Some(v) = var("TAKTGEBER_EXECUTION") {
            self.execution_address = Some(v);
        }
        if let Some(ms) = var("TAKTGEBER_RECONNECT_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.reconnect_backoff_ms = ms;
        }
        if var("TAKTGEBER_DEBUG").is_some() {
            self.logging.debug = true;
        }

        if let Some(host) = var("GRAYLOG2_HOST") {
            let graylog = self.logging.graylog.get_or_insert_with(|| GraylogConfig {
                host: String::new(),
                port: default_graylog_port(),
                source: default_graylog_source(),
            });
            graylog.host = host;
        }
        if let Some(graylog) = self.logging.graylog.as_mut() {
            if let Some(port) = var("GRAYLOG2_PORT").and_then(|v| v.parse().ok()) {
                graylog.port = port;
            }
            if let Some(source) = var("GRAYLOG2_SOURCE") {
                graylog.source = source;
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), CronError> {
        Transport::parse(&self.directory_address).map_err(|e| {
            CronError::Config(format!(
                "directory_address {:?}: {e}",
                self.directory_address
            ))
        })?;
        if let Some(execution) = &self.execution_address {
            Transport::parse(execution).map_err(|e| {
                CronError::Config(format!("execution_address {execution:?}: {e}"))
            })?;
        }
        if self.reconnect_backoff_ms == 0 {
            return Err(CronError::Config(
                "reconnect_backoff_ms must be greater than zero".into(),
            ));
        }
        if let Some(graylog) = &self.logging.graylog {
            if graylog.host.is_empty() {
                return Err(CronError::Config("logging.graylog.host is empty".into()));
            }
        }
        Ok(())
    }
}

/// Load a `.env` file from the working directory, if there is one.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}
