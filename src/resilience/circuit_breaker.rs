//! Circuit breaker for upstream instance protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: instance assumed down, calls fail fast
//! - Half-Open: a single probe decides whether the instance recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold within window
//! Open → Half-Open: first call after cooldown
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per endpoint (not per service)
//! - A dropped half-open probe counts as a failure, so the probe slot is
//!   never lost; other dropped permits (caller cancelled) are neutral
//! - Outcomes from permits issued before the last transition are ignored

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::HalfOpen => "half_open",
            CircuitState::Open => "open",
        }
    }
}

/// Call rejected because the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit open")]
pub struct CircuitOpen;

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    streak_started: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Per-endpoint circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            window: Duration::from_millis(config.window_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                streak_started: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker mutex poisoned")
            .consecutive_failures
    }

    /// Ask permission to make a call.
    ///
    /// The returned permit must be settled with [`BreakerPermit::success`]
    /// or [`BreakerPermit::failure`]. Dropping an unsettled probe counts as
    /// a failure; dropping any other permit records nothing.
    pub fn acquire(&self) -> Result<BreakerPermit<'_>, CircuitOpen> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");

        let probe = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at) >= self.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return Err(CircuitOpen);
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(CircuitOpen);
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self,
            generation: inner.generation,
            probe,
            settled: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.generation != generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.streak_started = None;
            }
            CircuitState::HalfOpen => {
                tracing::info!(endpoint = %self.name, "Probe succeeded, closing circuit");
                self.transition(&mut inner, CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        if inner.generation != generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                let stale = match inner.streak_started {
                    Some(start) => {
                        !self.window.is_zero() && now.saturating_duration_since(start) > self.window
                    }
                    None => true,
                };
                if stale {
                    inner.consecutive_failures = 0;
                    inner.streak_started = Some(now);
                }
                inner.consecutive_failures += 1;

                if inner.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        endpoint = %self.name,
                        failures = inner.consecutive_failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Failure threshold reached, opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(endpoint = %self.name, "Probe failed, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        inner.state = to;
        inner.generation = inner.generation.wrapping_add(1);
        inner.probe_in_flight = false;
        match to {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.streak_started = None;
                inner.opened_at = None;
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
            CircuitState::HalfOpen => {}
        }
        metrics::record_breaker_state(&self.name, to);
    }
}

/// Permission to make one call through a [`CircuitBreaker`].
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this call is the half-open probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_failure(self.generation);
        }
    }
}
