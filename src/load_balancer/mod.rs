//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher attempt
//!     → Endpointer snapshot (current endpoints, sorted by address)
//!     → round_robin.rs (pick the next endpoint)
//!     → InvocableEndpoint::invoke
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless apart from their cursor; membership lives in
//!   the endpointer
//! - Endpoints with an open circuit are still handed out and fail fast

pub mod round_robin;

use std::sync::Arc;

use crate::dispatch::{DispatchError, InvocableEndpoint};

pub use round_robin::RoundRobin;

/// Strategy for choosing an endpoint from a snapshot.
pub trait LoadBalancer: Send + Sync {
    /// Pick one endpoint, or `NoHealthyInstance` for an empty snapshot.
    fn pick(&self, endpoints: &[Arc<InvocableEndpoint>]) -> Result<Arc<InvocableEndpoint>, DispatchError>;
}
