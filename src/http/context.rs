//! Per-request context.
//!
//! # Responsibilities
//! - Capture the request fields handlers and encoders need (method, path,
//!   forwarding headers, raw Authorization header, request ID)
//! - Normalize the bearer token from query, cookie or header
//! - Carry the resolved identity once the auth middleware has run
//!
//! # Design Decisions
//! - Populated once at request entry and stored in request extensions
//! - Treated as immutable; authentication produces an enriched copy
//! - Token precedence is query > cookie > header, first non-empty wins

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, OriginalUri},
    http::{header, request::Parts, HeaderMap, Method, Request, Uri, Version},
    middleware::Next,
    response::Response,
};
use url::form_urlencoded;

use crate::auth::session::CachedIdentity;

/// Query parameter and cookie name carrying the bearer token.
pub const ACCESS_TOKEN: &str = "access_token";

/// Request ID header set by the serving edge.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Typed request context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub path: String,
    pub version: Version,
    pub host: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub forwarded_for: Option<String>,
    pub forwarded_proto: Option<String>,
    /// Raw `Authorization` header, forwarded upstream unchanged.
    pub authorization: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub accept: Option<String>,
    /// Normalized bearer token.
    pub access_token: Option<String>,
    /// Gateway route prefix stripped before forwarding upstream.
    pub gateway_prefix: Option<String>,
    /// Identity resolved by the auth middleware.
    pub identity: Option<CachedIdentity>,
}

impl RequestContext {
    /// Build a context from request parts.
    ///
    /// Inside nested routers the URI is taken from [`OriginalUri`], so the
    /// path always includes the gateway prefix.
    pub fn from_parts(parts: &Parts, remote_addr: Option<SocketAddr>) -> Self {
        let headers = &parts.headers;
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|OriginalUri(uri)| uri.clone())
            .unwrap_or_else(|| parts.uri.clone());
        Self {
            method: parts.method.clone(),
            path: uri.path().to_string(),
            version: parts.version,
            host: header_string(headers, header::HOST.as_str())
                .or_else(|| uri.authority().map(|a| a.to_string())),
            remote_addr,
            forwarded_for: header_string(headers, "x-forwarded-for"),
            forwarded_proto: header_string(headers, "x-forwarded-proto"),
            authorization: header_string(headers, header::AUTHORIZATION.as_str()),
            referer: header_string(headers, header::REFERER.as_str()),
            user_agent: header_string(headers, header::USER_AGENT.as_str()),
            request_id: header_string(headers, X_REQUEST_ID),
            accept: header_string(headers, header::ACCEPT.as_str()),
            access_token: extract_access_token(&uri, headers),
            gateway_prefix: None,
            identity: None,
            uri,
        }
    }

    /// Context for calls that do not originate from an inbound request.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    /// Inbound query pairs, minus the bearer token.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.uri
            .query()
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .filter(|(k, _)| k != ACCESS_TOKEN)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn with_gateway_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.gateway_prefix = Some(prefix.into());
        self
    }

    /// Copy of this context carrying an authenticated identity.
    pub fn with_identity(&self, identity: CachedIdentity) -> Self {
        Self {
            identity: Some(identity),
            ..self.clone()
        }
    }

    /// Path upstream services should see, with the gateway prefix removed.
    pub fn upstream_path(&self) -> Option<&str> {
        let prefix = self.gateway_prefix.as_deref()?;
        if prefix.is_empty() {
            return None;
        }
        let rest = self.path.strip_prefix(prefix)?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Locate the bearer token: query parameter, then cookie, then header.
pub fn extract_access_token(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    token_from_query(uri)
        .or_else(|| token_from_cookie(headers))
        .or_else(|| token_from_header(headers))
}

fn token_from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == ACCESS_TOKEN)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_TOKEN)
        .and_then(|(_, value)| unescape(value))
        .filter(|v| !v.is_empty())
}

fn unescape(value: &str) -> Option<String> {
    let input = format!("v={}", value);
    form_urlencoded::parse(input.as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
}

fn token_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let scheme = value.get(..7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    let token = value[7..].trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Middleware populating [`RequestContext`] into request extensions.
pub async fn populate_context(mut req: Request<Body>, next: Next) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let (parts, body) = req.into_parts();
    let ctx = RequestContext::from_parts(&parts, remote);
    req = Request::from_parts(parts, body);
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(RequestContext::from_parts(parts, remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn test_query_token_wins() {
        let p = parts(
            Request::builder()
                .uri("/users?access_token=from-query")
                .header("Cookie", "access_token=from-cookie")
                .header("Authorization", "Bearer from-header")
                .body(())
                .unwrap(),
        );
        let ctx = RequestContext::from_parts(&p, None);
        assert_eq!(ctx.access_token.as_deref(), Some("from-query"));
    }

    #[test]
    fn test_cookie_beats_header_and_is_unescaped() {
        let p = parts(
            Request::builder()
                .uri("/users?access_token=")
                .header("Cookie", "theme=dark; access_token=abc%2Edef")
                .header("Authorization", "Bearer from-header")
                .body(())
                .unwrap(),
        );
        let ctx = RequestContext::from_parts(&p, None);
        assert_eq!(ctx.access_token.as_deref(), Some("abc.def"));
    }

    #[test]
    fn test_bearer_prefix_is_case_insensitive() {
        let p = parts(
            Request::builder()
                .uri("/")
                .header("Authorization", "bEaReR tok123")
                .body(())
                .unwrap(),
        );
        let ctx = RequestContext::from_parts(&p, None);
        assert_eq!(ctx.access_token.as_deref(), Some("tok123"));
        assert_eq!(ctx.authorization.as_deref(), Some("bEaReR tok123"));
    }

    #[test]
    fn test_non_bearer_header_is_ignored() {
        let p = parts(
            Request::builder()
                .uri("/")
                .header("Authorization", "Basic dXNlcjpwYXNz")
                .body(())
                .unwrap(),
        );
        assert!(RequestContext::from_parts(&p, None).access_token.is_none());
    }

    #[test]
    fn test_no_credentials() {
        let p = parts(Request::builder().uri("/").body(()).unwrap());
        let ctx = RequestContext::from_parts(&p, None);
        assert!(ctx.access_token.is_none());
        assert!(ctx.authorization.is_none());
    }

    #[test]
    fn test_query_pairs_drop_token() {
        let p = parts(
            Request::builder()
                .uri("/api/users?page=2&access_token=t&q=a%20b")
                .body(())
                .unwrap(),
        );
        let ctx = RequestContext::from_parts(&p, None);
        assert_eq!(
            ctx.query_pairs(),
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "a b".to_string())
            ]
        );
    }

    #[test]
    fn test_original_uri_wins_inside_nested_routers() {
        let mut p = parts(Request::builder().uri("/list").body(()).unwrap());
        p.extensions
            .insert(OriginalUri("/api/users/list".parse().unwrap()));
        let ctx = RequestContext::from_parts(&p, None).with_gateway_prefix("/api/users");
        assert_eq!(ctx.path, "/api/users/list");
        assert_eq!(ctx.upstream_path(), Some("/list"));
    }

    #[test]
    fn test_upstream_path_strips_prefix() {
        let p = parts(Request::builder().uri("/api/users/list?page=2").body(()).unwrap());
        let ctx = RequestContext::from_parts(&p, None).with_gateway_prefix("/api");
        assert_eq!(ctx.upstream_path(), Some("/users/list"));

        let ctx = ctx.with_gateway_prefix("/apis");
        assert_eq!(ctx.upstream_path(), None);

        let p = parts(Request::builder().uri("/api").body(()).unwrap());
        let ctx = RequestContext::from_parts(&p, None).with_gateway_prefix("/api");
        assert_eq!(ctx.upstream_path(), Some("/"));
    }
}
