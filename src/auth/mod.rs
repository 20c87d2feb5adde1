//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext.access_token
//!     → claims.rs (HS256 verify, exp/nbf)
//!     → cipher.rs (base64 + AES-CBC identity handle → raw user ID)
//!     → session.rs (cached identity record, expiry)
//!     → middleware.rs (attach identity or reply with a 1006 envelope)
//! ```
//!
//! # Design Decisions
//! - Tokens carry a sealed handle, never the raw user ID
//! - Every rejection is an HTTP 200 envelope naming the reason
//! - Issuing tokens lives here too so tests and tooling share one path

pub mod cipher;
pub mod claims;
pub mod error;
pub mod middleware;
pub mod session;

pub use cipher::{AesCbcCipher, CipherError, IdentityCipher};
pub use claims::{AccessClaims, TokenKeys};
pub use error::AuthError;
pub use middleware::{require_auth, Authenticator, IssueError};
pub use session::{cache_key, CachedIdentity, SessionStore};
