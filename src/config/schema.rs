//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration for the serving edge and upstream connects.
    pub timeouts: TimeoutConfig,

    /// Token signing and identity cipher keys.
    pub auth: AuthConfig,

    /// Identity cache backend.
    pub cache: CacheConfig,

    /// Retry policy for upstream dispatch.
    pub dispatch: DispatchConfig,

    /// Per-instance circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Service registry used for discovery.
    pub discovery: DiscoveryConfig,

    /// Optional self-registration with the service registry.
    pub registration: RegistrationConfig,

    /// Upstream services exposed through the gateway.
    pub services: Vec<ServiceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum inbound request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Inbound request timeout (whole request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 1_000,
            request_secs: 30,
        }
    }
}

/// Keys used by the auth middleware.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing key for access tokens.
    pub signing_key: String,

    /// AES key sealing identity handles (16, 24 or 32 bytes).
    pub cipher_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("cipher_key", &"<redacted>")
            .finish()
    }
}

/// Identity cache backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local map, for development and tests.
    #[default]
    Memory,
    Redis,
}

/// Identity cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Redis URL (redis:// or rediss://).
    pub url: String,

    /// Per-call timeout for cache operations in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: "redis://127.0.0.1:6379".to_string(),
            timeout_ms: 500,
        }
    }
}

impl CacheConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry configuration for upstream dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of attempts per logical call.
    pub max_attempts: u32,

    /// Overall deadline for one logical call in milliseconds.
    pub timeout_ms: u64,

    /// Deadline for a single attempt in milliseconds.
    pub per_call_timeout_ms: u64,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 500,
            per_call_timeout_ms: 250,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

/// Circuit breaker configuration, applied per upstream instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Failures older than this no longer count towards the threshold
    /// (milliseconds, 0 disables the window).
    pub window_ms: u64,

    /// How long an open circuit rejects calls before admitting a probe
    /// (milliseconds).
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window_ms: 60_000,
            cooldown_ms: 30_000,
        }
    }
}

/// Service registry (Consul) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Enable registry-backed discovery.
    pub enabled: bool,

    /// Registry agent address (host:port).
    pub address: String,

    /// URI scheme for the registry agent.
    pub scheme: String,

    /// Datacenter to query; the agent default when unset.
    pub datacenter: Option<String>,

    /// ACL token sent with every registry request.
    pub token: Option<String>,

    /// Maximum blocking-query wait in seconds.
    pub wait_secs: u64,

    /// Only report instances whose health checks pass.
    pub passing_only: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "127.0.0.1:8500".to_string(),
            scheme: "http".to_string(),
            datacenter: None,
            token: None,
            wait_secs: 30,
            passing_only: true,
        }
    }
}

/// Self-registration of the gateway with the registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub enabled: bool,

    /// Service ID; generated from the name when empty.
    pub id: String,

    pub name: String,

    /// Address advertised to the registry.
    pub address: String,

    pub port: u16,

    pub tags: Vec<String>,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            id: String::new(),
            name: "service-gateway".to_string(),
            address: "127.0.0.1".to_string(),
            port: 8080,
            tags: Vec::new(),
        }
    }
}

/// One upstream service exposed under a gateway prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Registry service name.
    pub name: String,

    /// Gateway path prefix (e.g. "/api/users"), stripped before forwarding.
    pub prefix: String,

    /// Upstream route used when the inbound path carries no prefix.
    #[serde(default = "default_route")]
    pub route: String,

    /// Upstream HTTP method (GET or POST).
    #[serde(default = "default_method")]
    pub method: String,

    /// Require an authenticated identity.
    #[serde(default)]
    pub auth: bool,

    /// Registry tags an instance must carry.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Static instance addresses; when empty the registry is watched.
    #[serde(default)]
    pub instances: Vec<String>,
}

fn default_route() -> String {
    "/".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
