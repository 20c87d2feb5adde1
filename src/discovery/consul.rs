//! Consul registry client.
//!
//! # Responsibilities
//! - Register and deregister this process with the local agent
//! - Watch a service's healthy instances through blocking queries
//!
//! # Design Decisions
//! - Plain HTTP API over reqwest, no agent SDK
//! - The first tag is filtered server-side, the rest client-side
//! - Query failures are reported on the stream and retried with backoff

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use super::instancer::{DiscoveryError, Instance, InstanceStream, Instancer, Liveness};
use crate::config::{DiscoveryConfig, RegistrationConfig};
use crate::resilience::backoff::backoff_delay;

const CONSUL_INDEX: &str = "x-consul-index";
const CONSUL_TOKEN: &str = "x-consul-token";

/// Health check interval advertised at registration.
pub const CHECK_INTERVAL: &str = "30s";
/// Health check timeout advertised at registration.
pub const CHECK_TIMEOUT: &str = "5s";

/// Service registration payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
    pub enable_tag_override: bool,
    pub check: AgentCheck,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub timeout: String,
    pub interval: String,
}

impl AgentRegistration {
    /// Registration advertising an HTTP health check at `/health`.
    pub fn from_config(config: &RegistrationConfig) -> Self {
        let id = if config.id.is_empty() {
            format!("{}-{}-{}", config.name, config.address, config.port)
        } else {
            config.id.clone()
        };
        Self {
            id,
            name: config.name.clone(),
            tags: config.tags.clone(),
            address: config.address.clone(),
            port: config.port,
            enable_tag_override: false,
            check: AgentCheck {
                http: format!("http://{}:{}/health", config.address, config.port),
                timeout: CHECK_TIMEOUT.to_string(),
                interval: CHECK_INTERVAL.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceEntry {
    node: NodeInfo,
    service: ServiceInfo,
    #[serde(default)]
    checks: Vec<CheckInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeInfo {
    #[serde(default)]
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceInfo {
    #[serde(default)]
    address: String,
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CheckInfo {
    status: String,
}

impl ServiceEntry {
    fn into_instance(self) -> Instance {
        let host = if self.service.address.is_empty() {
            self.node.address
        } else {
            self.service.address
        };
        let liveness = if self.checks.iter().any(|c| c.status == "critical") {
            Liveness::Critical
        } else if self.checks.iter().any(|c| c.status == "warning") {
            Liveness::Warning
        } else {
            Liveness::Passing
        };
        Instance {
            address: format!("{}:{}", host, self.service.port),
            liveness,
            tags: self.service.tags.unwrap_or_default(),
        }
    }
}

/// Minimal client for the Consul agent HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    http: reqwest::Client,
    base: Url,
    datacenter: Option<String>,
    token: Option<String>,
    wait: Duration,
}

impl ConsulClient {
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let base = Url::parse(&format!("{}://{}", config.scheme, config.address))?;
        let wait = Duration::from_secs(config.wait_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(wait + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base,
            datacenter: config.datacenter.clone(),
            token: config.token.clone(),
            wait,
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self
            .token
            .as_deref()
            .and_then(|t| reqwest::header::HeaderValue::from_str(t).ok())
        {
            headers.insert(CONSUL_TOKEN, value);
        }
        headers
    }

    /// Register a service with the local agent.
    pub async fn register(&self, registration: &AgentRegistration) -> Result<(), DiscoveryError> {
        let url = self.base.join("/v1/agent/service/register")?;
        let response = self
            .http
            .put(url)
            .headers(self.headers())
            .json(registration)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }
        tracing::info!(
            id = %registration.id,
            name = %registration.name,
            check = %registration.check.http,
            "Registered with service registry"
        );
        Ok(())
    }

    pub async fn deregister(&self, id: &str) -> Result<(), DiscoveryError> {
        let url = self.base.join(&format!("/v1/agent/service/deregister/{}", id))?;
        let response = self.http.put(url).headers(self.headers()).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }
        tracing::info!(id = %id, "Deregistered from service registry");
        Ok(())
    }

    /// One blocking query; returns the instances and the new index, if the
    /// agent sent one.
    pub async fn health_service(
        &self,
        service: &str,
        tag: Option<&str>,
        passing_only: bool,
        index: u64,
    ) -> Result<(Vec<Instance>, Option<u64>), DiscoveryError> {
        let mut url = self.base.join(&format!("/v1/health/service/{}", service))?;
        {
            let mut query = url.query_pairs_mut();
            if passing_only {
                query.append_pair("passing", "true");
            }
            if let Some(tag) = tag {
                query.append_pair("tag", tag);
            }
            if let Some(dc) = self.datacenter.as_deref() {
                query.append_pair("dc", dc);
            }
            if index > 0 {
                query.append_pair("index", &index.to_string());
                query.append_pair("wait", &format!("{}s", self.wait.as_secs()));
            }
        }

        let response = self.http.get(url).headers(self.headers()).send().await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status().as_u16()));
        }
        let next_index = response
            .headers()
            .get(CONSUL_INDEX)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .filter(|index| *index > 0);
        let entries: Vec<ServiceEntry> = response.json().await?;

        Ok((
            entries.into_iter().map(ServiceEntry::into_instance).collect(),
            next_index,
        ))
    }
}

struct WatchState {
    client: ConsulClient,
    service: String,
    tags: Vec<String>,
    passing_only: bool,
    index: u64,
    failures: u32,
    pause: Duration,
}

/// Decide what a successful query means for the watch: whether to emit,
/// the index for the next query and how long to wait before sending it.
///
/// Without an index the agent cannot block, so the watch polls every `wait`.
fn next_watch(previous: u64, returned: Option<u64>, wait: Duration) -> (bool, u64, Duration) {
    match returned {
        None => (true, 0, wait),
        Some(index) => {
            let changed = previous == 0 || index != previous;
            // The registry index can go backwards after a restart.
            let next = if index < previous { 0 } else { index };
            (changed, next, Duration::ZERO)
        }
    }
}

impl Instancer for ConsulClient {
    fn watch(&self, service: &str, tags: &[String], passing_only: bool) -> InstanceStream {
        let state = WatchState {
            client: self.clone(),
            service: service.to_string(),
            tags: tags.to_vec(),
            passing_only,
            index: 0,
            failures: 0,
            pause: Duration::ZERO,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if !state.pause.is_zero() {
                    tokio::time::sleep(std::mem::take(&mut state.pause)).await;
                }
                let result = state
                    .client
                    .health_service(
                        &state.service,
                        state.tags.first().map(String::as_str),
                        state.passing_only,
                        state.index,
                    )
                    .await;

                match result {
                    Ok((instances, index)) => {
                        state.failures = 0;
                        let (changed, next, pause) = next_watch(state.index, index, state.client.wait);
                        state.index = next;
                        state.pause = pause;
                        if !changed {
                            continue;
                        }
                        let rest = state.tags.get(1..).unwrap_or(&[]).to_vec();
                        let instances = instances.into_iter().filter(|i| i.has_tags(&rest)).collect();
                        return Some((Ok(instances), state));
                    }
                    Err(e) => {
                        state.failures += 1;
                        let pause = backoff_delay(
                            state.failures,
                            Duration::from_millis(100),
                            Duration::from_secs(30),
                        );
                        tracing::warn!(
                            service = %state.service,
                            error = %e,
                            retry_in_ms = pause.as_millis() as u64,
                            "Registry watch failed"
                        );
                        tokio::time::sleep(pause).await;
                        return Some((Err(e), state));
                    }
                }
            }
        })
        .boxed()
    }
}
