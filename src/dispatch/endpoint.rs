//! Invocable endpoint bound to one upstream instance.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use url::Url;

use super::encode::EncodedRequest;
use super::error::DispatchError;
use super::transport::Transport;
use crate::http::context::RequestContext;
use crate::http::envelope::Envelope;
use crate::resilience::circuit_breaker::CircuitBreaker;

/// One remote operation on one instance, wrapped in its own breaker.
pub struct InvocableEndpoint {
    instance: String,
    base: Url,
    method: Method,
    route: String,
    transport: Arc<dyn Transport>,
    breaker: CircuitBreaker,
}

impl fmt::Debug for InvocableEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocableEndpoint")
            .field("instance", &self.instance)
            .field("method", &self.method)
            .field("route", &self.route)
            .field("breaker", &self.breaker.state())
            .finish()
    }
}

impl InvocableEndpoint {
    pub(crate) fn new(
        instance: String,
        base: Url,
        method: Method,
        route: String,
        transport: Arc<dyn Transport>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            instance,
            base,
            method,
            route,
            transport,
            breaker,
        }
    }

    /// Instance address this endpoint was built from.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Make one call, bounded by `limit`.
    ///
    /// Gateway statuses (502/503/504) and connection failures are transport
    /// errors. Any other reply is decoded as an envelope; an application
    /// error inside a well-formed envelope is a successful call.
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        request: &EncodedRequest,
        limit: Duration,
    ) -> Result<Envelope, DispatchError> {
        let permit = self
            .breaker
            .acquire()
            .map_err(|_| DispatchError::CircuitOpen {
                instance: self.instance.clone(),
            })?;

        let upstream = request.to_upstream(&self.method, &self.base, &self.route, ctx);
        tracing::debug!(
            instance = %self.instance,
            method = %self.method,
            url = %upstream.url,
            probe = permit.is_probe(),
            "Invoking endpoint"
        );

        let response = match tokio::time::timeout(limit, self.transport.send(upstream)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                permit.failure();
                return Err(self.transport_error(e.to_string()));
            }
            Err(_) => {
                permit.failure();
                return Err(self.transport_error(format!("timed out after {:?}", limit)));
            }
        };

        if matches!(
            response.status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            permit.failure();
            return Err(self.transport_error(format!("upstream status {}", response.status)));
        }

        match Envelope::decode(&response.body) {
            Ok(envelope) => {
                permit.success();
                Ok(envelope)
            }
            Err(source) => {
                permit.failure();
                tracing::warn!(
                    instance = %self.instance,
                    status = %response.status,
                    error = %source,
                    "Upstream reply is not an envelope"
                );
                Err(DispatchError::EnvelopeDecode {
                    instance: self.instance.clone(),
                    source,
                })
            }
        }
    }

    fn transport_error(&self, reason: String) -> DispatchError {
        DispatchError::Transport {
            instance: self.instance.clone(),
            reason,
        }
    }
}
