//! Scheduler allocation lookups.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::directory::LookupError;

/// Where the scheduler placed an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub node_url: String,
    pub node_id: Option<String>,
    pub vm_ipv6: Option<String>,
}

/// Answers "which node runs this instance?". `Ok(None)` means the
/// instance is not scheduled yet.
#[async_trait]
pub trait AllocationSource: Send + Sync {
    async fn allocation(&self, instance_id: &str) -> Result<Option<Allocation>, LookupError>;
}

#[derive(Deserialize)]
struct AllocationBody {
    #[serde(default)]
    node: Option<NodeBody>,
    #[serde(default)]
    vm_ipv6: Option<String>,
}

#[derive(Deserialize)]
struct NodeBody {
    #[serde(default, alias = "address")]
    url: Option<String>,
    #[serde(default)]
    node_id: Option<String>,
}

/// `GET {scheduler}/api/v0/allocation/{instance}`.
#[derive(Clone)]
pub struct SchedulerApi {
    base_url: String,
    client: reqwest::Client,
}

impl SchedulerApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: crate::http_client(timeout),
        }
    }
}

#[async_trait]
impl AllocationSource for SchedulerApi {
    async fn allocation(&self, instance_id: &str) -> Result<Option<Allocation>, LookupError> {
        let url = format!("{}/api/v0/allocation/{instance_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(instance_id, "scheduler has no allocation yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body: AllocationBody = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;
        let Some(node) = body.node else {
            return Ok(None);
        };
        let Some(node_url) = node.url.filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(Allocation {
            node_url: normalize_url(&node_url),
            node_id: node.node_id,
            vm_ipv6: body.vm_ipv6,
        }))
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
