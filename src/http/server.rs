//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the index, health and service routes
//! - Mount every configured service under its prefix, behind auth when set
//! - Wire up middleware (request ID, tracing, limits, timeout, panics)
//! - Render not-found, method-not-allowed, oversized bodies, timeouts and
//!   panics as envelopes
//! - Serve with graceful shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::{require_auth, Authenticator};
use crate::config::GatewayConfig;
use crate::http::context::populate_context;
use crate::http::envelope::{codes, Envelope};
use crate::http::gateway::{forward, ServiceRoute};
use crate::lifecycle::shutdown::wait_for;
use crate::observability::metrics;

const X_POWER: &str = "x-power";
const POWERED_BY: &str = "service-gateway";

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, routes: &[Arc<ServiceRoute>], authenticator: &Authenticator) -> Self {
        let router = Self::build_router(&config, routes, authenticator);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &GatewayConfig,
        routes: &[Arc<ServiceRoute>],
        authenticator: &Authenticator,
    ) -> Router {
        let mut router = Router::new()
            .route("/", get(index))
            .route("/health", get(index));

        for route in routes {
            let mut service = Router::new()
                .route("/", any(forward))
                .route("/{*rest}", any(forward));
            if route.auth {
                service = service.route_layer(middleware::from_fn_with_state(
                    authenticator.clone(),
                    require_auth,
                ));
            }
            tracing::info!(
                service = %route.name,
                prefix = %route.prefix,
                method = %route.method,
                auth = route.auth,
                "Mounted service"
            );
            router = router.nest(&route.prefix, service.with_state(route.clone()));
        }

        router
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .layer(middleware::from_fn(populate_context))
            .layer(middleware::from_fn(track_requests))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::map_response(envelope_rejections))
            .layer(CatchPanicLayer::custom(panic_envelope))
            .layer(SetResponseHeaderLayer::overriding(
                HeaderName::from_static(X_POWER),
                HeaderValue::from_static(POWERED_BY),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            request_timeout_secs = self.config.timeouts.request_secs,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// `/` and `/health`: service identity, also used as the registry check.
async fn index() -> Envelope {
    Envelope::row(json!({
        "service": POWERED_BY,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> Envelope {
    Envelope::error(codes::NOT_FOUND, "no route matches the request path")
}

async fn method_not_allowed() -> Envelope {
    Envelope::new(codes::METHOD_NOT_ALLOWED)
}

async fn track_requests(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let response = next.run(req).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Body-limit and timeout layers answer with bare 413/408; wrap them.
async fn envelope_rejections(response: Response) -> Response {
    match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => {
            Envelope::error(codes::PARAMS_ERROR, "request body too large").into_response()
        }
        StatusCode::REQUEST_TIMEOUT => {
            tracing::warn!("Request timed out");
            Envelope::error(codes::EXCEPTION, "request timed out").into_response()
        }
        _ => response,
    }
}

fn panic_envelope(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    Envelope::error(codes::EXCEPTION, detail).into_response()
}
