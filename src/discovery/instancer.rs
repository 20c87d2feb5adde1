//! Instance sources.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Health of an instance as reported by its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Passing,
    Warning,
    Critical,
}

/// One running copy of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instance {
    /// `host:port` or a full URL.
    pub address: String,
    pub liveness: Liveness,
    pub tags: Vec<String>,
}

impl Instance {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            liveness: Liveness::Passing,
            tags: Vec::new(),
        }
    }

    pub fn is_passing(&self) -> bool {
        self.liveness == Liveness::Passing
    }

    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|t| self.tags.contains(t))
    }
}

/// Discovery failures reported on the instance stream.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned status {0}")]
    Status(u16),

    #[error("invalid registry address: {0}")]
    Address(#[from] url::ParseError),
}

/// Stream of complete instance sets; each item replaces the previous one.
pub type InstanceStream = BoxStream<'static, Result<Vec<Instance>, DiscoveryError>>;

/// Source of instance sets for a service.
pub trait Instancer: Send + Sync {
    /// Watch `service`, keeping only instances carrying every tag in `tags`
    /// (and passing their checks when `passing_only`).
    fn watch(&self, service: &str, tags: &[String], passing_only: bool) -> InstanceStream;
}

/// In-process instancer fed from configuration.
#[derive(Debug, Default)]
pub struct StaticInstancer {
    services: DashMap<String, watch::Sender<Vec<Instance>>>,
}

impl StaticInstancer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the instance set of `service`, notifying watchers.
    pub fn set(&self, service: &str, instances: Vec<Instance>) {
        let sender = self.sender(service);
        sender.send_if_modified(|current| {
            if *current == instances {
                return false;
            }
            *current = instances;
            true
        });
        tracing::debug!(service = %service, "Static instance set updated");
    }

    /// Convenience for address-only instance sets.
    pub fn set_addresses<I, S>(&self, service: &str, addresses: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(service, addresses.into_iter().map(Instance::new).collect());
    }

    fn sender(&self, service: &str) -> watch::Sender<Vec<Instance>> {
        self.services
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .clone()
    }
}

impl Instancer for StaticInstancer {
    fn watch(&self, service: &str, tags: &[String], passing_only: bool) -> InstanceStream {
        let rx = self.sender(service).subscribe();
        let tags = tags.to_vec();

        stream::unfold((rx, true), move |(mut rx, first)| {
            let tags = tags.clone();
            async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                let current: Vec<Instance> = rx
                    .borrow_and_update()
                    .iter()
                    .filter(|i| i.has_tags(&tags) && (!passing_only || i.is_passing()))
                    .cloned()
                    .collect();
                Some((Ok(current), (rx, false)))
            }
        })
        .boxed()
    }
}
