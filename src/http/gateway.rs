//! Gateway forwarding: inbound request → upstream service call.
//!
//! # Responsibilities
//! - Re-encode the inbound request for the service's upstream method
//! - Dispatch through the service's retrying dispatcher
//! - Render every outcome as an envelope
//!
//! # Design Decisions
//! - GET forwards the inbound query; POST forwards the JSON body
//! - The service prefix is stripped from the path before forwarding

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::dispatch::{DispatchError, EncodedRequest};
use crate::http::context::RequestContext;
use crate::http::envelope::{codes, Envelope};
use crate::resilience::Dispatcher;

/// One upstream service mounted under a gateway prefix.
pub struct ServiceRoute {
    pub name: String,
    pub prefix: String,
    /// Upstream method every forwarded call uses.
    pub method: Method,
    pub auth: bool,
    pub dispatcher: Dispatcher,
}

/// Forwarding failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Params(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl GatewayError {
    pub fn to_envelope(&self) -> Envelope {
        match self {
            GatewayError::Params(reason) => Envelope::error(codes::PARAMS_ERROR, reason.clone()),
            GatewayError::Dispatch(e) => e.to_envelope(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.to_envelope().into_response()
    }
}

/// Encode the inbound request for `method`.
pub fn encode_inbound(method: &Method, ctx: &RequestContext, body: &[u8]) -> Result<EncodedRequest, GatewayError> {
    if *method == Method::POST {
        let payload: Value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Default::default())
        } else {
            serde_json::from_slice(body)
                .map_err(|e| GatewayError::Params(format!("request body is not valid JSON: {}", e)))?
        };
        Ok(EncodedRequest::from_json(&payload)?)
    } else {
        Ok(EncodedRequest::from_pairs(ctx.query_pairs()))
    }
}

/// Handler mounted at every service prefix.
pub async fn forward(
    State(route): State<Arc<ServiceRoute>>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Envelope, GatewayError> {
    let ctx = ctx.with_gateway_prefix(route.prefix.clone());
    let request = encode_inbound(&route.method, &ctx, &body)?;

    tracing::debug!(
        service = %route.name,
        path = %ctx.path,
        upstream_path = ctx.upstream_path().unwrap_or("-"),
        request_id = ctx.request_id.as_deref().unwrap_or("-"),
        "Forwarding request"
    );

    let envelope = route.dispatcher.invoke(&ctx, &request).await?;
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn ctx(uri: &str) -> RequestContext {
        let (parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        RequestContext::from_parts(&parts, None)
    }

    #[test]
    fn test_get_forwards_query_without_token() {
        let req = encode_inbound(&Method::GET, &ctx("/api/users?page=3&access_token=t"), b"").unwrap();
        assert_eq!(req.query, vec![("page".to_string(), "3".to_string())]);
        assert!(req.body.is_none());
    }

    #[test]
    fn test_post_forwards_json() {
        let req = encode_inbound(&Method::POST, &ctx("/api/users"), br#"{"name":"ann"}"#).unwrap();
        let body: Value = serde_json::from_slice(&req.body.unwrap()).unwrap();
        assert_eq!(body["name"], "ann");
    }

    #[test]
    fn test_post_empty_body_is_empty_object() {
        let req = encode_inbound(&Method::POST, &ctx("/api/users"), b"").unwrap();
        assert_eq!(req.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_post_rejects_non_json() {
        let err = encode_inbound(&Method::POST, &ctx("/api/users"), b"name=ann").unwrap_err();
        assert_eq!(err.to_envelope().status, codes::PARAMS_ERROR);
    }
}
