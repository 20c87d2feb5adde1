//! Cached identity records.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, IdentityCache};

/// Identity record stored in the cache under [`cache_key`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedIdentity {
    pub id: i64,
    pub name: String,
    pub status: i32,
    /// Session expiry, Unix seconds.
    pub expires_in: i64,
    pub message: String,
}

impl CachedIdentity {
    pub fn is_active_at(&self, now: i64) -> bool {
        self.expires_in > now
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(unix_now())
    }
}

/// Current time in Unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Cache key for a raw user ID.
pub fn cache_key(raw_id: &str) -> String {
    format!("user:user:{}", raw_id)
}

/// Typed access to identity records in an [`IdentityCache`].
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn IdentityCache>,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn IdentityCache>) -> Self {
        Self { cache }
    }

    /// Load the record for `raw_id`; `Ok(None)` on a miss.
    pub async fn load(&self, raw_id: &str) -> Result<Option<CachedIdentity>, CacheError> {
        match self.cache.get(&cache_key(raw_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Store the record for `raw_id` with no TTL.
    pub async fn store(&self, raw_id: &str, record: &CachedIdentity) -> Result<(), CacheError> {
        let json = serde_json::to_string(record)?;
        self.cache.set(&cache_key(raw_id), &json, None).await
    }
}
