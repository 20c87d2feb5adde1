//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the identity cache, token keys and cipher
//! - Build one endpoint factory, endpointer and dispatcher per service
//! - Choose the instance source per service (static list or registry)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::auth::{AesCbcCipher, Authenticator, CipherError, SessionStore, TokenKeys};
use crate::cache::{CacheError, IdentityCache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, GatewayConfig, ServiceConfig};
use crate::discovery::{
    AgentRegistration, ConsulClient, DiscoveryError, Endpointer, Instance, Instancer, StaticInstancer,
};
use crate::dispatch::{EndpointFactory, HttpTransport, Transport, TransportError};
use crate::http::{HttpServer, ServiceRoute};
use crate::resilience::{Dispatcher, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("identity cipher: {0}")]
    Cipher(#[from] CipherError),

    #[error("identity cache: {0}")]
    Cache(#[from] CacheError),

    #[error("upstream transport: {0}")]
    Transport(#[from] TransportError),

    #[error("service registry: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("service {service}: unsupported method {method}")]
    Method { service: String, method: String },
}

/// Fully wired gateway, ready to serve.
pub struct Gateway {
    pub config: GatewayConfig,
    pub authenticator: Authenticator,
    pub routes: Vec<Arc<ServiceRoute>>,
    pub instancer: Arc<StaticInstancer>,
    pub registry: Option<ConsulClient>,
}

impl Gateway {
    pub fn server(&self) -> HttpServer {
        HttpServer::new(self.config.clone(), &self.routes, &self.authenticator)
    }

    /// Apply static instance lists from a reloaded configuration.
    pub fn apply_instances(&self, config: &GatewayConfig) {
        for service in &config.services {
            if !self.routes.iter().any(|r| r.name == service.name) {
                tracing::warn!(service = %service.name, "New services need a restart, ignoring");
                continue;
            }
            if service.instances.is_empty() {
                continue;
            }
            self.instancer.set(&service.name, static_instances(service));
            tracing::info!(
                service = %service.name,
                instances = service.instances.len(),
                "Static instances reloaded"
            );
        }
    }

    /// Register with the service registry when enabled; returns the ID.
    pub async fn register(&self) -> Result<Option<String>, DiscoveryError> {
        let Some(registry) = self.registry.as_ref() else {
            return Ok(None);
        };
        if !self.config.registration.enabled {
            return Ok(None);
        }
        let registration = AgentRegistration::from_config(&self.config.registration);
        registry.register(&registration).await?;
        Ok(Some(registration.id))
    }
}

/// Build the gateway, connecting to the configured identity cache.
pub async fn build_gateway(config: GatewayConfig) -> Result<Gateway, StartupError> {
    let cache: Arc<dyn IdentityCache> = match config.cache.backend {
        CacheBackend::Memory => {
            tracing::warn!("Using in-process identity cache; sessions are not shared");
            Arc::new(MemoryCache::new())
        }
        CacheBackend::Redis => Arc::new(RedisCache::connect(&config.cache.url, config.cache.timeout()).await?),
    };
    let transport = Arc::new(HttpTransport::new(Duration::from_millis(config.timeouts.connect_ms))?);
    build_gateway_with(config, cache, transport)
}

/// Build the gateway around an existing cache and transport.
pub fn build_gateway_with(
    config: GatewayConfig,
    cache: Arc<dyn IdentityCache>,
    transport: Arc<dyn Transport>,
) -> Result<Gateway, StartupError> {
    let cipher = Arc::new(AesCbcCipher::new(config.auth.cipher_key.as_bytes())?);
    let authenticator = Authenticator::new(
        TokenKeys::from_secret(config.auth.signing_key.as_bytes()),
        cipher,
        SessionStore::new(cache),
    );

    let registry = if config.discovery.enabled {
        Some(ConsulClient::new(&config.discovery)?)
    } else {
        None
    };
    let instancer = StaticInstancer::new();
    let policy = RetryPolicy::from(&config.dispatch);

    let mut routes = Vec::with_capacity(config.services.len());
    for service in &config.services {
        let method = parse_method(service)?;
        let factory = EndpointFactory::new(
            method.clone(),
            service.route.clone(),
            transport.clone(),
            config.breaker.clone(),
        );

        let stream = match registry.as_ref() {
            Some(registry) if service.instances.is_empty() => {
                tracing::info!(service = %service.name, tags = ?service.tags, "Watching registry");
                registry.watch(&service.name, &service.tags, config.discovery.passing_only)
            }
            _ => {
                instancer.set(&service.name, static_instances(service));
                instancer.watch(&service.name, &service.tags, false)
            }
        };
        let endpointer = Arc::new(Endpointer::spawn(&service.name, stream, factory));

        routes.push(Arc::new(ServiceRoute {
            name: service.name.clone(),
            prefix: service.prefix.clone(),
            method,
            auth: service.auth,
            dispatcher: Dispatcher::new(service.name.clone(), endpointer, policy.clone()),
        }));
    }

    Ok(Gateway {
        config,
        authenticator,
        routes,
        instancer,
        registry,
    })
}

fn static_instances(service: &ServiceConfig) -> Vec<Instance> {
    service
        .instances
        .iter()
        .map(|address| Instance {
            tags: service.tags.clone(),
            ..Instance::new(address.clone())
        })
        .collect()
}

fn parse_method(service: &ServiceConfig) -> Result<Method, StartupError> {
    match service.method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        _ => Err(StartupError::Method {
            service: service.name.clone(),
            method: service.method.clone(),
        }),
    }
}
