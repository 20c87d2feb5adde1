//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Registry (consul.rs) or config (StaticInstancer)
//!     → Instancer::watch (stream of complete instance sets)
//!     → endpointer.rs (build/reuse one endpoint per address)
//!     → snapshot consumed by the load balancer
//! ```
//!
//! # Design Decisions
//! - Every event carries the full set; there are no incremental diffs
//! - Membership changes never block in-flight calls

pub mod consul;
pub mod endpointer;
pub mod instancer;

pub use consul::{AgentRegistration, ConsulClient};
pub use endpointer::{EndpointCache, Endpointer};
pub use instancer::{DiscoveryError, Instance, InstanceStream, Instancer, Liveness, StaticInstancer};
