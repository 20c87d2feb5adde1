//! Authentication middleware.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! ```text
//! token present → signature/time claims → handle base64
//!     → handle decrypt → cache lookup → session expiry
//! ```
//!
//! The cache is only touched once the token has been fully validated.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::cipher::{seal_handle, CipherError, IdentityCipher};
use super::claims::{AccessClaims, TokenKeys};
use super::error::AuthError;
use super::session::{unix_now, CachedIdentity, SessionStore};
use crate::cache::CacheError;
use crate::http::context::RequestContext;
use crate::http::envelope::Envelope;
use crate::observability::metrics;

/// Failure to issue a token.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("sealing identity failed: {0}")]
    Cipher(#[from] CipherError),

    #[error("signing token failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("storing session failed: {0}")]
    Cache(#[from] CacheError),
}

/// Resolves request contexts to cached identities.
#[derive(Clone)]
pub struct Authenticator {
    keys: Arc<TokenKeys>,
    cipher: Arc<dyn IdentityCipher>,
    sessions: SessionStore,
}

impl Authenticator {
    pub fn new(keys: TokenKeys, cipher: Arc<dyn IdentityCipher>, sessions: SessionStore) -> Self {
        Self {
            keys: Arc::new(keys),
            cipher,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run every check against `ctx`.
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<CachedIdentity, AuthError> {
        let token = ctx
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;

        let claims = self.keys.verify(token)?;

        let sealed = STANDARD
            .decode(claims.id.as_bytes())
            .map_err(|_| AuthError::MalformedHandle)?;
        let raw = self
            .cipher
            .decrypt(&sealed)
            .map_err(|_| AuthError::DecryptFailure)?;
        let raw_id = String::from_utf8(raw).map_err(|_| AuthError::DecryptFailure)?;

        let record = match self.sessions.load(&raw_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(AuthError::NoSession),
            Err(e) => {
                tracing::warn!(error = %e, "Identity cache lookup failed");
                return Err(AuthError::NoSession);
            }
        };

        if !record.is_active_at(unix_now()) {
            return Err(AuthError::SessionExpired);
        }
        Ok(record)
    }

    /// Run `inner` with an authenticated copy of `ctx`, or return the
    /// rejection envelope without calling it.
    pub async fn guard<F, Fut>(&self, ctx: &RequestContext, inner: F) -> Envelope
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = Envelope>,
    {
        match self.authenticate(ctx).await {
            Ok(identity) => inner(ctx.with_identity(identity)).await,
            Err(e) => {
                metrics::record_auth_rejection(e.reason());
                e.to_envelope()
            }
        }
    }

    /// Store `record` as the session of `raw_id` and mint a token for it.
    pub async fn issue(&self, raw_id: &str, record: &CachedIdentity) -> Result<String, IssueError> {
        let handle = seal_handle(self.cipher.as_ref(), raw_id)?;
        let token = self
            .keys
            .sign(&AccessClaims::new(handle, record.name.clone(), record.expires_in))?;
        self.sessions.store(raw_id, record).await?;
        Ok(token)
    }
}

/// Axum middleware rejecting unauthenticated requests with a 1006 envelope.
pub async fn require_auth(
    State(auth): State<Authenticator>,
    ctx: RequestContext,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match auth.authenticate(&ctx).await {
        Ok(identity) => {
            tracing::debug!(
                user_id = identity.id,
                request_id = ctx.request_id.as_deref().unwrap_or("-"),
                "Request authenticated"
            );
            req.extensions_mut().insert(ctx.with_identity(identity));
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(
                reason = e.reason(),
                path = %ctx.path,
                request_id = ctx.request_id.as_deref().unwrap_or("-"),
                "Request rejected"
            );
            metrics::record_auth_rejection(e.reason());
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::auth::cipher::AesCbcCipher;
    use crate::cache::{IdentityCache, MemoryCache};
    use crate::http::envelope::codes;

    const CIPHER_KEY: &[u8] = b"0123456789abcdef";

    #[derive(Default)]
    struct CountingCache {
        inner: MemoryCache,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl IdentityCache for CountingCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }
    }

    fn authenticator(cache: Arc<CountingCache>) -> Authenticator {
        Authenticator::new(
            TokenKeys::from_secret(b"secret"),
            Arc::new(AesCbcCipher::new(CIPHER_KEY).unwrap()),
            SessionStore::new(cache),
        )
    }

    fn record(expires_in: i64) -> CachedIdentity {
        CachedIdentity {
            id: 7,
            name: "ann".into(),
            status: 1,
            expires_in,
            message: String::new(),
        }
    }

    fn ctx(token: &str) -> RequestContext {
        RequestContext::detached().with_access_token(token)
    }

    #[tokio::test]
    async fn test_missing_token_skips_cache() {
        let cache = Arc::new(CountingCache::default());
        let auth = authenticator(cache.clone());

        let err = auth.authenticate(&RequestContext::detached()).await.unwrap_err();
        assert_eq!(err, AuthError::MissingCredential);
        assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_token_skips_cache() {
        let cache = Arc::new(CountingCache::default());
        let auth = authenticator(cache.clone());

        assert_eq!(auth.authenticate(&ctx("garbage")).await, Err(AuthError::MalformedToken));
        assert_eq!(cache.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_issued_token_authenticates() {
        let cache = Arc::new(CountingCache::default());
        let auth = authenticator(cache.clone());
        let token = auth.issue("7", &record(unix_now() + 3600)).await.unwrap();

        let identity = auth.authenticate(&ctx(&token)).await.unwrap();
        assert_eq!(identity.id, 7);
        assert_eq!(cache.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_that_is_not_base64() {
        let auth = authenticator(Arc::new(CountingCache::default()));
        let token = TokenKeys::from_secret(b"secret")
            .sign(&AccessClaims::new("***", "ann", unix_now() + 60))
            .unwrap();
        assert_eq!(auth.authenticate(&ctx(&token)).await, Err(AuthError::MalformedHandle));
    }

    #[tokio::test]
    async fn test_handle_that_does_not_decrypt() {
        let auth = authenticator(Arc::new(CountingCache::default()));
        // Valid base64, but not a whole number of cipher blocks.
        let token = TokenKeys::from_secret(b"secret")
            .sign(&AccessClaims::new("AAAA", "ann", unix_now() + 60))
            .unwrap();
        assert_eq!(auth.authenticate(&ctx(&token)).await, Err(AuthError::DecryptFailure));
    }

    #[tokio::test]
    async fn test_no_session() {
        let cache = Arc::new(CountingCache::default());
        let auth = authenticator(cache);
        let handle = seal_handle(&AesCbcCipher::new(CIPHER_KEY).unwrap(), "99").unwrap();
        let token = TokenKeys::from_secret(b"secret")
            .sign(&AccessClaims::new(handle, "bob", unix_now() + 60))
            .unwrap();
        assert_eq!(auth.authenticate(&ctx(&token)).await, Err(AuthError::NoSession));
    }

    #[tokio::test]
    async fn test_expired_session() {
        let cache = Arc::new(CountingCache::default());
        let auth = authenticator(cache);
        let token = auth.issue("7", &record(unix_now() + 3600)).await.unwrap();
        auth.sessions().store("7", &record(unix_now() - 1)).await.unwrap();

        assert_eq!(auth.authenticate(&ctx(&token)).await, Err(AuthError::SessionExpired));
    }

    #[tokio::test]
    async fn test_guard_renders_rejection() {
        let auth = authenticator(Arc::new(CountingCache::default()));
        let env = auth
            .guard(&RequestContext::detached(), |_| async { Envelope::ok() })
            .await;
        assert_eq!(env.status, codes::UNAUTHORIZED);
        assert_eq!(
            env.errors.unwrap().get("message").map(String::as_str),
            Some("missing credential")
        );
    }

    #[tokio::test]
    async fn test_guard_passes_identity_through() {
        let auth = authenticator(Arc::new(CountingCache::default()));
        let token = auth.issue("7", &record(unix_now() + 3600)).await.unwrap();
        let env = auth
            .guard(&ctx(&token), |ctx| async move {
                Envelope::row(ctx.identity.map(|i| i.name))
            })
            .await;
        assert_eq!(env.data, Some(serde_json::json!("ann")));
    }
}
