//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates the new file
//!     → static instance lists pushed to the StaticInstancer
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A config that fails validation never replaces the running one

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, BreakerConfig, CacheBackend, CacheConfig, DiscoveryConfig, DispatchConfig,
    GatewayConfig, ListenerConfig, ObservabilityConfig, RegistrationConfig, ServiceConfig,
    TimeoutConfig,
};
pub use watcher::ConfigWatcher;
