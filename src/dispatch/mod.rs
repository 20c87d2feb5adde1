//! Upstream dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Typed request
//!     → encode.rs (query string or JSON body)
//!     → Dispatcher (resilience/retries.rs): deadline + attempts
//!         → load balancer picks an endpoint
//!         → endpoint.rs: breaker permit → transport → envelope decode
//!     → Envelope or DispatchError
//! ```
//!
//! # Design Decisions
//! - One endpoint per (operation, instance); each owns its breaker
//! - Transport is a trait so resilience behaviour is testable in-process
//! - Application errors arrive inside envelopes and are not failures

pub mod encode;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod transport;

pub use encode::{EncodedRequest, Headerer, QueryFields, QueryValue};
pub use endpoint::InvocableEndpoint;
pub use error::DispatchError;
pub use factory::EndpointFactory;
pub use transport::{HttpTransport, Transport, TransportError, UpstreamRequest, UpstreamResponse};
