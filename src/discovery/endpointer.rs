//! Endpointer: instance sets → cached endpoints.
//!
//! # Responsibilities
//! - Subscribe to an instance stream and build one endpoint per address
//! - Reuse endpoints (and their breakers) for addresses that stay
//! - Publish an immutable snapshot sorted by address
//!
//! # Design Decisions
//! - Readers load the snapshot through `ArcSwap`, never blocking the watcher
//! - A discovery error keeps the last good set
//! - Addresses the factory rejects are logged and skipped

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use futures_util::StreamExt;
use tokio::task::JoinHandle;

use super::instancer::{Instance, InstanceStream};
use crate::dispatch::{EndpointFactory, InvocableEndpoint};
use crate::observability::metrics;

/// Address-keyed endpoint cache with a lock-free read snapshot.
#[derive(Debug)]
pub struct EndpointCache {
    service: String,
    factory: EndpointFactory,
    by_address: Mutex<HashMap<String, Arc<InvocableEndpoint>>>,
    snapshot: ArcSwap<Vec<Arc<InvocableEndpoint>>>,
}

impl EndpointCache {
    pub fn new(service: impl Into<String>, factory: EndpointFactory) -> Self {
        Self {
            service: service.into(),
            factory,
            by_address: Mutex::new(HashMap::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replace the membership with `instances`.
    pub fn update(&self, instances: &[Instance]) {
        let mut cached = self.by_address.lock().expect("endpoint cache mutex poisoned");
        let mut next = HashMap::with_capacity(instances.len());

        for instance in instances {
            if next.contains_key(&instance.address) {
                continue;
            }
            if let Some(existing) = cached.remove(&instance.address) {
                next.insert(instance.address.clone(), existing);
                continue;
            }
            match self.factory.build(&instance.address) {
                Ok(endpoint) => {
                    tracing::info!(
                        service = %self.service,
                        instance = %instance.address,
                        "Endpoint added"
                    );
                    next.insert(instance.address.clone(), endpoint);
                }
                Err(e) => {
                    tracing::warn!(
                        service = %self.service,
                        instance = %instance.address,
                        error = %e,
                        "Skipping instance"
                    );
                }
            }
        }

        for address in cached.keys() {
            tracing::info!(service = %self.service, instance = %address, "Endpoint removed");
        }

        let mut snapshot: Vec<Arc<InvocableEndpoint>> = next.values().cloned().collect();
        snapshot.sort_by(|a, b| a.instance().cmp(b.instance()));
        metrics::record_instances(&self.service, snapshot.len());

        *cached = next;
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Current endpoints, sorted by address.
    pub fn endpoints(&self) -> Arc<Vec<Arc<InvocableEndpoint>>> {
        self.snapshot.load_full()
    }
}

/// Keeps an [`EndpointCache`] in sync with an instance stream.
#[derive(Debug)]
pub struct Endpointer {
    cache: Arc<EndpointCache>,
    task: Option<JoinHandle<()>>,
}

impl Endpointer {
    /// Spawn a task applying every set from `stream` to a fresh cache.
    pub fn spawn(service: &str, mut stream: InstanceStream, factory: EndpointFactory) -> Self {
        let cache = Arc::new(EndpointCache::new(service, factory));
        let watcher = cache.clone();
        let service = service.to_string();

        let task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                match event {
                    Ok(instances) => watcher.update(&instances),
                    Err(e) => {
                        tracing::warn!(
                            service = %service,
                            error = %e,
                            "Discovery error, keeping last known instances"
                        );
                    }
                }
            }
            tracing::debug!(service = %service, "Instance stream ended");
        });

        Self {
            cache,
            task: Some(task),
        }
    }

    /// Endpointer over a fixed address list.
    pub fn fixed<I, S>(service: &str, addresses: I, factory: EndpointFactory) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache = Arc::new(EndpointCache::new(service, factory));
        let instances: Vec<Instance> = addresses.into_iter().map(Instance::new).collect();
        cache.update(&instances);
        Self { cache, task: None }
    }

    pub fn endpoints(&self) -> Arc<Vec<Arc<InvocableEndpoint>>> {
        self.cache.endpoints()
    }
}

impl Drop for Endpointer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
