//! Authenticating API gateway library.

pub mod auth;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use http::{Envelope, HttpServer};
pub use lifecycle::Shutdown;
