//! Retrying dispatcher.
//!
//! # Responsibilities
//! - Bound a logical call by an overall deadline and an attempt budget
//! - Pick a fresh endpoint for every attempt
//! - Back off between transport failures
//!
//! # Design Decisions
//! - An open circuit is retried immediately on the next endpoint
//! - Decode and encode failures are final: the instance answered
//! - Each attempt gets min(per-call timeout, time remaining)

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::DispatchConfig;
use crate::discovery::Endpointer;
use crate::dispatch::{DispatchError, EncodedRequest};
use crate::http::context::RequestContext;
use crate::http::envelope::Envelope;
use crate::load_balancer::{LoadBalancer, RoundRobin};
use crate::observability::metrics;
use crate::resilience::backoff::backoff_delay;
use crate::resilience::timeouts::Deadline;

/// Attempt budget and timing for one logical call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub per_call_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
            per_call_timeout: Duration::from_millis(config.per_call_timeout_ms),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

/// Load-balanced, retrying client for one service operation.
pub struct Dispatcher<B = RoundRobin> {
    service: String,
    endpointer: Arc<Endpointer>,
    balancer: B,
    policy: RetryPolicy,
}

impl Dispatcher<RoundRobin> {
    pub fn new(service: impl Into<String>, endpointer: Arc<Endpointer>, policy: RetryPolicy) -> Self {
        Self::with_balancer(service, endpointer, RoundRobin::new(), policy)
    }
}

impl<B: LoadBalancer> Dispatcher<B> {
    pub fn with_balancer(
        service: impl Into<String>,
        endpointer: Arc<Endpointer>,
        balancer: B,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service: service.into(),
            endpointer,
            balancer,
            policy,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpointer(&self) -> &Endpointer {
        &self.endpointer
    }

    /// Perform one logical call.
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        request: &EncodedRequest,
    ) -> Result<Envelope, DispatchError> {
        let start = Instant::now();
        let deadline = Deadline::after(self.policy.timeout);
        let mut attempts = 0u32;

        let result = loop {
            attempts += 1;
            let err = match self.attempt(ctx, request, &deadline).await {
                Ok(envelope) => {
                    metrics::record_attempt(&self.service, "success");
                    break Ok(envelope);
                }
                Err(e) => e,
            };
            metrics::record_attempt(&self.service, err.kind());

            if !err.is_retryable() {
                break Err(err);
            }
            if attempts >= self.policy.max_attempts || deadline.is_expired() {
                break Err(DispatchError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let pause = match err {
                DispatchError::CircuitOpen { .. } => Duration::ZERO,
                _ => deadline.clamp(backoff_delay(
                    attempts,
                    self.policy.base_delay,
                    self.policy.max_delay,
                )),
            };
            tracing::debug!(
                service = %self.service,
                attempt = attempts,
                error = %err,
                backoff_ms = pause.as_millis() as u64,
                "Attempt failed, retrying"
            );
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            if deadline.is_expired() {
                break Err(DispatchError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::record_dispatch(&self.service, outcome, start);
        if let Err(e) = &result {
            tracing::warn!(
                service = %self.service,
                attempts,
                error = %e,
                request_id = ctx.request_id.as_deref().unwrap_or("-"),
                "Dispatch failed"
            );
        }
        result
    }

    async fn attempt(
        &self,
        ctx: &RequestContext,
        request: &EncodedRequest,
        deadline: &Deadline,
    ) -> Result<Envelope, DispatchError> {
        let snapshot = self.endpointer.endpoints();
        let endpoint = self.balancer.pick(&snapshot)?;
        let limit = deadline.clamp(self.policy.per_call_timeout);
        endpoint.invoke(ctx, request, limit).await
    }
}
