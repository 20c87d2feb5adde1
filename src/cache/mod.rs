//! Identity cache subsystem.
//!
//! # Data Flow
//! ```text
//! Auth middleware
//!     → SessionStore (auth/session.rs) builds `user:user:<id>` keys
//!     → IdentityCache::get / set
//!         - memory.rs (DashMap, process-local)
//!         - redis.rs (shared Redis via ConnectionManager)
//! ```
//!
//! # Design Decisions
//! - Values are opaque JSON strings; the session layer owns the schema
//! - Every backend call is bounded by the backend's own timeout

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

/// Cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cached value is not a valid record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Key/value store holding cached identity records.
#[async_trait]
pub trait IdentityCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`; `None` keeps it until overwritten.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
}
