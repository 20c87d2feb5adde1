//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, limits, timeout)
//!     → context.rs (RequestContext into extensions)
//!     → [auth middleware for protected prefixes]
//!     → gateway.rs (encode + dispatch upstream)
//!     → envelope.rs (uniform JSON reply, always HTTP 200)
//! ```

pub mod context;
pub mod envelope;
pub mod gateway;
pub mod server;

pub use context::{RequestContext, ACCESS_TOKEN, X_REQUEST_ID};
pub use envelope::{codes, Envelope, EnvelopeDecodeError};
pub use gateway::{GatewayError, ServiceRoute};
pub use server::HttpServer;
