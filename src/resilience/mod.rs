//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Logical call:
//!     → retries.rs (deadline, attempt budget, backoff between attempts)
//!     → timeouts.rs (clamp each attempt to the time remaining)
//!     → circuit_breaker.rs (per-endpoint permit, fail fast when open)
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - Breakers are per endpoint, so one bad instance never trips a service
//! - Only transport-level failures are retried

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitOpen, CircuitState};
pub use retries::{Dispatcher, RetryPolicy};
pub use timeouts::Deadline;
