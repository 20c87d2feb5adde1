//! Deadlines for logical calls.
//!
//! # Responsibilities
//! - Track the overall deadline of one dispatch
//! - Clamp per-attempt timeouts and backoff sleeps to the time remaining
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests drive it deterministically

use std::time::Duration;

use tokio::time::Instant;

/// Absolute deadline for a logical call.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// `limit`, shortened to whatever is left before the deadline.
    pub fn clamp(&self, limit: Duration) -> Duration {
        limit.min(self.remaining())
    }
}
