//! Configuration for the DNS exporter.
//!
//! Values come from, in increasing order of precedence: built-in defaults, an
//! optional JSON5 file, the `BIND_ADDR` / `QUERY_TIMEOUT` environment
//! variables, and command-line flags.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the listen address.
pub const BIND_ADDR_ENV: &str = "BIND_ADDR";
/// Environment variable overriding the query timeout (e.g. `5s`, `750ms`).
pub const QUERY_TIMEOUT_ENV: &str = "QUERY_TIMEOUT";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Invalid {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to initialize tracing: {0}")]
    Logging(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP server and probe settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint and probe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (default: "0.0.0.0:9153").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path of the probe endpoint (default: "/probe").
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// How long a single probe may take (default: "5s").
    #[serde(default = "default_query_timeout", with = "duration_str")]
    pub query_timeout: Duration,
}

fn default_listen() -> String {
    "0.0.0.0:9153".to_string()
}

fn default_probe_path() -> String {
    "/probe".to_string()
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            probe_path: default_probe_path(),
            query_timeout: default_query_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated; call [`ExporterConfig::validate`] once
    /// every override has been applied.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        Ok(config)
    }

    /// Apply `BIND_ADDR` and `QUERY_TIMEOUT` from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup(BIND_ADDR_ENV).filter(|v| !v.is_empty()) {
            self.server.listen = listen;
        }

        if let Some(timeout) = lookup(QUERY_TIMEOUT_ENV).filter(|v| !v.is_empty()) {
            let timeout = parse_duration(&timeout).map_err(|message| ConfigError::Env {
                var: QUERY_TIMEOUT_ENV,
                message,
            })?;
            self.server.query_timeout = timeout;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.server.listen
            )));
        }

        if self.server.query_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "query_timeout must be > 0".to_string(),
            ));
        }

        if !self.server.probe_path.starts_with('/') || self.server.probe_path == "/health" {
            return Err(ConfigError::Validation(
                "Probe path must start with / and differ from /health".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a duration such as `5s`, `750ms`, `1m30s` or `2.5s`.
///
/// Accepts the units `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0`
/// is allowed; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration '{}'", input);

    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }

    let mut nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{}'", input))?;
        let (number, tail) = rest.split_at(number_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(format!("unknown unit '{}' in duration '{}'", unit, input)),
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac = &frac[..frac.len().min(18)];
        let frac_value: u128 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        let frac_scale = 10u128.pow(frac.len() as u32);

        nanos = whole
            .checked_mul(unit_nanos)
            .and_then(|n| n.checked_add(frac_value * unit_nanos / frac_scale))
            .and_then(|n| nanos.checked_add(n))
            .ok_or_else(invalid)?;

        rest = next;
    }

    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

/// Render a duration in the format accepted by [`parse_duration`].
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
