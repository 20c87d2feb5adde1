//! Endpoint factory: instance address → invocable endpoint.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use url::Url;

use super::endpoint::InvocableEndpoint;
use super::error::DispatchError;
use super::transport::Transport;
use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::CircuitBreaker;

/// Builds endpoints for one remote operation (method + route).
#[derive(Clone)]
pub struct EndpointFactory {
    method: Method,
    route: String,
    transport: Arc<dyn Transport>,
    breaker: BreakerConfig,
}

impl fmt::Debug for EndpointFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointFactory")
            .field("method", &self.method)
            .field("route", &self.route)
            .finish()
    }
}

impl EndpointFactory {
    pub fn new(
        method: Method,
        route: impl Into<String>,
        transport: Arc<dyn Transport>,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            method,
            route: route.into(),
            transport,
            breaker,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Build an endpoint for `instance`, prefixing `http://` when the
    /// address carries no `scheme://`.
    pub fn build(&self, instance: &str) -> Result<Arc<InvocableEndpoint>, DispatchError> {
        let target = if instance.contains("://") {
            instance.to_string()
        } else {
            format!("http://{}", instance)
        };

        let base = Url::parse(&target).map_err(|e| DispatchError::AddressInvalid {
            address: instance.to_string(),
            reason: e.to_string(),
        })?;
        if base.host_str().map_or(true, str::is_empty) {
            return Err(DispatchError::AddressInvalid {
                address: instance.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Arc::new(InvocableEndpoint::new(
            instance.to_string(),
            base,
            self.method.clone(),
            self.route.clone(),
            self.transport.clone(),
            CircuitBreaker::new(instance, &self.breaker),
        )))
    }
}
