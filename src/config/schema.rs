//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::signals::ShutdownSignal;

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP serving settings (bind address, readiness endpoint).
    pub http: HttpConfig,

    /// Startup and shutdown budgets.
    pub lifecycle: LifecycleConfig,

    /// Administrative endpoints.
    pub admin: AdminConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// HTTP serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// IP address or hostname to bind (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Port to bind. 0 picks an ephemeral port.
    pub bind_port: u16,

    /// Install `GET /healthz` and verify it during startup.
    pub healthz: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    /// The `host:port` string the listener binds to.
    pub fn address(&self) -> String {
        if self.bind_address.contains(':') && !self.bind_address.starts_with('[') {
            format!("[{}]:{}", self.bind_address, self.bind_port)
        } else {
            format!("{}:{}", self.bind_address, self.bind_port)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 8080,
            healthz: true,
            max_connections: 10_000,
            request_timeout_secs: 30,
        }
    }
}

/// Startup verification and shutdown budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Overall deadline for the readiness probe loop, in seconds.
    pub startup_timeout_secs: u64,

    /// Delay between readiness probes, in milliseconds.
    pub probe_interval_ms: u64,

    /// Graceful drain deadline for in-flight connections, in seconds.
    pub drain_timeout_secs: u64,

    /// Budget for each registered cleanup callback, in seconds.
    pub cleanup_timeout_secs: u64,

    /// OS signals that trigger a graceful shutdown.
    pub signals: Vec<ShutdownSignal>,
}

impl LifecycleConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 10,
            probe_interval_ms: 1_000,
            drain_timeout_secs: 10,
            cleanup_timeout_secs: 15,
            signals: ShutdownSignal::defaults().to_vec(),
        }
    }
}

/// Administrative endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount `/admin/*` routes.
    pub enabled: bool,

    /// Bearer token required by the admin routes.
    pub api_key: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{}` (expected pretty or json)", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format for log lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
