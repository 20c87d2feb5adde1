//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, key lengths, attempts >= 1)
//! - Detect conflicting service prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{CacheBackend, GatewayConfig};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.auth.signing_key.is_empty() {
        errors.push(ValidationError::new("auth.signing_key", "must be set"));
    }
    if !matches!(config.auth.cipher_key.len(), 16 | 24 | 32) {
        errors.push(ValidationError::new(
            "auth.cipher_key",
            "must be 16, 24 or 32 bytes",
        ));
    }

    if config.cache.backend == CacheBackend::Redis && config.cache.url.is_empty() {
        errors.push(ValidationError::new("cache.url", "required for the redis backend"));
    }
    if config.cache.timeout_ms == 0 {
        errors.push(ValidationError::new("cache.timeout_ms", "must be > 0"));
    }

    let dispatch = &config.dispatch;
    if dispatch.max_attempts == 0 {
        errors.push(ValidationError::new("dispatch.max_attempts", "must be >= 1"));
    }
    if dispatch.timeout_ms == 0 {
        errors.push(ValidationError::new("dispatch.timeout_ms", "must be > 0"));
    }
    if dispatch.per_call_timeout_ms == 0 {
        errors.push(ValidationError::new("dispatch.per_call_timeout_ms", "must be > 0"));
    }
    if dispatch.base_delay_ms > dispatch.max_delay_ms {
        errors.push(ValidationError::new(
            "dispatch.base_delay_ms",
            "must not exceed dispatch.max_delay_ms",
        ));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be >= 1"));
    }

    if config.registration.enabled && !config.discovery.enabled {
        errors.push(ValidationError::new(
            "registration.enabled",
            "requires discovery.enabled",
        ));
    }

    let mut prefixes = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = |name: &str| format!("services[{}].{}", i, name);

        if service.name.is_empty() {
            errors.push(ValidationError::new(field("name"), "must be set"));
        }
        if !service.prefix.starts_with('/') || service.prefix.len() < 2 || service.prefix.ends_with('/') {
            errors.push(ValidationError::new(
                field("prefix"),
                "must start with '/', not end with '/', and not be the root",
            ));
        } else if service.prefix == "/health" {
            errors.push(ValidationError::new(field("prefix"), "'/health' is reserved"));
        } else if !prefixes.insert(service.prefix.as_str()) {
            errors.push(ValidationError::new(field("prefix"), "duplicate prefix"));
        }
        if !service.route.starts_with('/') {
            errors.push(ValidationError::new(field("route"), "must start with '/'"));
        }
        if !matches!(service.method.to_ascii_uppercase().as_str(), "GET" | "POST") {
            errors.push(ValidationError::new(field("method"), "must be GET or POST"));
        }
        if service.instances.is_empty() && !config.discovery.enabled {
            errors.push(ValidationError::new(
                field("instances"),
                "required when discovery is disabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn valid() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.signing_key = "secret".into();
        config.auth.cipher_key = "0123456789abcdef".into();
        config.services.push(ServiceConfig {
            name: "users".into(),
            prefix: "/api/users".into(),
            route: "/".into(),
            method: "GET".into(),
            auth: true,
            tags: Vec::new(),
            instances: vec!["127.0.0.1:3000".into()],
        });
        config
    }

    fn fields(config: &GatewayConfig) -> Vec<String> {
        validate_config(config)
            .err()
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.field)
            .collect()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_duplicate_prefix() {
        let mut config = valid();
        let dup = config.services[0].clone();
        config.services.push(dup);
        assert_eq!(fields(&config), vec!["services[1].prefix"]);
    }

    #[test]
    fn test_static_instances_required_without_discovery() {
        let mut config = valid();
        config.services[0].instances.clear();
        assert_eq!(fields(&config), vec!["services[0].instances"]);

        config.discovery.enabled = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_ranges() {
        let mut config = valid();
        config.dispatch.max_attempts = 0;
        config.breaker.failure_threshold = 0;
        config.services[0].method = "DELETE".into();
        assert_eq!(
            fields(&config),
            vec![
                "dispatch.max_attempts",
                "breaker.failure_threshold",
                "services[0].method"
            ]
        );
    }
}
