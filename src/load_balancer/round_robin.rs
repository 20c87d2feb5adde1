//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::{DispatchError, InvocableEndpoint};
use crate::load_balancer::LoadBalancer;

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn pick(&self, endpoints: &[Arc<InvocableEndpoint>]) -> Result<Arc<InvocableEndpoint>, DispatchError> {
        if endpoints.is_empty() {
            return Err(DispatchError::NoHealthyInstance);
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        Ok(endpoints[index].clone())
    }
}
