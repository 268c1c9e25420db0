//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LOGS_URL: &str = "https://api.logging.eu-west-1.prod.firetail.app/logs/bulk";

/// Root configuration for the intercepting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, concurrency).
    pub listener: ListenerConfig,

    /// The single upstream every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Interception settings: schema, audit endpoint, credentials.
    pub firetail: FiretailConfig,

    /// Validator client settings.
    pub validator: ValidatorConfig,

    /// Audit record delivery.
    pub audit: AuditConfig,

    /// Routing scopes that switch interception on or off.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum requests in flight (backpressure).
    pub max_concurrent_requests: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_concurrent_requests: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FiretailConfig {
    /// Interception for requests no route matches.
    pub enabled: bool,

    /// API schema handed to the validator. Read once at startup.
    pub spec_path: Option<String>,

    /// Passed to the validator as-is.
    pub allow_undefined_routes: bool,

    /// Bulk endpoint receiving ND-JSON audit records.
    pub logs_url: String,

    /// Sent as `x-ft-api-key`. Empty disables remote audit delivery.
    pub api_token: String,
}

impl Default for FiretailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            spec_path: None,
            allow_undefined_routes: false,
            logs_url: DEFAULT_LOGS_URL.to_string(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Base URL of the validator sidecar.
    pub url: String,

    /// Deadline per validator call, including the wait for a slot.
    pub timeout_ms: u64,

    /// Validator calls allowed in flight at once.
    pub max_concurrency: usize,
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:7070".to_string(),
            timeout_ms: 2000,
            max_concurrency: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Also emit each record to the local log.
    pub local_sink: bool,

    /// Records buffered before new ones are dropped.
    pub queue_capacity: usize,

    /// Records per ND-JSON POST.
    pub max_batch: usize,

    /// Delivery attempts per batch.
    pub max_attempts: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Timeout for one POST to the logging endpoint.
    pub request_timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            local_sink: false,
            queue_capacity: 1024,
            max_batch: 50,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            request_timeout_secs: 10,
        }
    }
}

/// Routing scope with its own interception switch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Host header to match (exact match, case-insensitive).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Intercept requests in this scope.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

fn default_enabled() -> bool {
    true
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum captured body size in bytes, per direction.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9100".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.firetail.logs_url, DEFAULT_LOGS_URL);
        assert!(config.firetail.enabled);
        assert_eq!(config.validator.timeout(), Duration::from_secs(2));
        assert_eq!(config.limits.max_body_size, 10_485_760);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_parses_sections() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            address = "10.0.0.5:9000"

            [firetail]
            spec_path = "/etc/firetail/appspec.yaml"
            allow_undefined_routes = true

            [observability]
            log_format = "json"

            [[routes]]
            name = "health"
            path_prefix = "/health"
            enabled = false
            priority = 10

            [[routes]]
            name = "api"
            host = "api.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.address, "10.0.0.5:9000");
        assert!(config.firetail.allow_undefined_routes);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.routes.len(), 2);
        assert!(!config.routes[0].enabled);
        assert!(config.routes[1].enabled);
        assert_eq!(config.routes[1].priority, 0);
    }
}
