//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and value ranges
//! - Detect duplicate or malformed routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ProxyConfig;

/// One semantic problem, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_positive(
        &mut errors,
        "listener.max_concurrent_requests",
        config.listener.max_concurrent_requests as u64,
    );

    check_socket_addr(&mut errors, "upstream.address", &config.upstream.address);

    check_url(&mut errors, "firetail.logs_url", &config.firetail.logs_url);
    if let Some(path) = &config.firetail.spec_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("firetail.spec_path", "must not be empty"));
        }
    }

    check_url(&mut errors, "validator.url", &config.validator.url);
    check_positive(&mut errors, "validator.timeout_ms", config.validator.timeout_ms);
    check_positive(
        &mut errors,
        "validator.max_concurrency",
        config.validator.max_concurrency as u64,
    );

    let audit = &config.audit;
    check_positive(&mut errors, "audit.queue_capacity", audit.queue_capacity as u64);
    check_positive(&mut errors, "audit.max_batch", audit.max_batch as u64);
    check_positive(&mut errors, "audit.max_attempts", audit.max_attempts as u64);
    check_positive(&mut errors, "audit.request_timeout_secs", audit.request_timeout_secs);
    if audit.base_delay_ms > audit.max_delay_ms {
        errors.push(ValidationError::new(
            "audit.base_delay_ms",
            format!("must not exceed audit.max_delay_ms ({})", audit.max_delay_ms),
        ));
    }

    check_positive(&mut errors, "timeouts.connect_secs", config.timeouts.connect_secs);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    check_positive(&mut errors, "limits.max_body_size", config.limits.max_body_size as u64);

    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if route.name.is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate route name '{}'", route.name),
            ));
        }
        if let Some(prefix) = &route.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::new(
                    format!("{}.path_prefix", field),
                    "must start with '/'",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::new(field, format!("'{}': {}", value, e)));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than zero"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str, prefix: Option<&str>) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            host: None,
            path_prefix: prefix.map(String::from),
            enabled: true,
            priority: 0,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.validator.url = "not a url".into();
        config.validator.timeout_ms = 0;
        config.audit.base_delay_ms = 10_000;
        config.routes = vec![route("api", Some("v1")), route("api", None)];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "validator.url",
                "validator.timeout_ms",
                "audit.base_delay_ms",
                "routes[0].path_prefix",
                "routes[1].name",
            ]
        );
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_enabled = false;
        config.observability.metrics_address = "bogus".into();
        assert!(validate_config(&config).is_ok());
    }
}
