//! Node directory strategies.
//!
//! Compute nodes publish the executions they host under a versioned
//! "about" API. Each version is one [`DirectoryEndpoint`]; the resolver
//! holds them newest first.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use skylift_core::NetworkAddress;

pub(crate) const SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The endpoint does not exist on this node; try an older version.
    #[error("endpoint unsupported (HTTP {0})")]
    Unsupported(u16),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LookupError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, LookupError::Unsupported(_))
    }
}

/// One version of the node directory API.
#[async_trait]
pub trait DirectoryEndpoint: Send + Sync {
    fn version(&self) -> &'static str;

    /// `Ok(None)` when the node does not (yet) expose an address for
    /// `instance_id`.
    async fn lookup(
        &self,
        node_url: &str,
        instance_id: &str,
    ) -> Result<Option<NetworkAddress>, LookupError>;
}

/// Fetch `{node}{path}` and return the entry for `instance_id`.
async fn fetch_execution(
    client: &reqwest::Client,
    node_url: &str,
    path: &str,
    instance_id: &str,
) -> Result<Option<Value>, LookupError> {
    let url = format!("{}{path}", node_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| LookupError::Transport(e.to_string()))?;

    let status = response.status();
    if matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    ) {
        return Err(LookupError::Unsupported(status.as_u16()));
    }
    if !status.is_success() {
        return Err(LookupError::Status(status.as_u16()));
    }

    let mut executions: HashMap<String, Value> = response
        .json()
        .await
        .map_err(|e| LookupError::Malformed(e.to_string()))?;
    Ok(executions.remove(instance_id))
}

// ── v2 ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct V2Execution {
    #[serde(default)]
    networking: Option<V2Networking>,
    #[serde(default)]
    running: Option<bool>,
}

#[derive(Deserialize)]
struct V2Networking {
    #[serde(default)]
    host_ipv4: Option<String>,
    #[serde(default)]
    ipv6_ip: Option<String>,
    #[serde(default)]
    mapped_ports: HashMap<String, MappedPort>,
}

#[derive(Deserialize)]
struct MappedPort {
    host: u16,
}

/// `GET {node}/v2/about/executions/list`. Prefers the host IPv4 with the
/// port mapped to guest port 22, falling back to the guest IPv6.
#[derive(Clone)]
pub struct CrnExecutionsV2 {
    client: reqwest::Client,
}

impl CrnExecutionsV2 {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: crate::http_client(timeout),
        }
    }
}

#[async_trait]
impl DirectoryEndpoint for CrnExecutionsV2 {
    fn version(&self) -> &'static str {
        "v2"
    }

    async fn lookup(
        &self,
        node_url: &str,
        instance_id: &str,
    ) -> Result<Option<NetworkAddress>, LookupError> {
        let Some(entry) =
            fetch_execution(&self.client, node_url, "/v2/about/executions/list", instance_id)
                .await?
        else {
            return Ok(None);
        };
        let execution: V2Execution =
            serde_json::from_value(entry).map_err(|e| LookupError::Malformed(e.to_string()))?;
        if execution.running == Some(false) {
            return Ok(None);
        }
        let Some(net) = execution.networking else {
            return Ok(None);
        };

        let mapped_ssh = net.mapped_ports.get(&SSH_PORT.to_string()).map(|p| p.host);
        if let (Some(ipv4), Some(port)) = (non_empty(net.host_ipv4), mapped_ssh) {
            return Ok(Some(NetworkAddress::new(ipv4, port)));
        }
        Ok(non_empty(net.ipv6_ip).map(|ip| NetworkAddress::new(strip_prefix_len(&ip), SSH_PORT)))
    }
}

// ── v1 ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct V1Execution {
    #[serde(default)]
    networking: Option<V1Networking>,
}

#[derive(Deserialize)]
struct V1Networking {
    #[serde(default)]
    ipv6: Option<String>,
}

/// `GET {node}/about/executions/list`. Only exposes the guest IPv6
/// (as `addr/prefix`); SSH listens on port 22 there.
#[derive(Clone)]
pub struct CrnExecutionsV1 {
    client: reqwest::Client,
}

impl CrnExecutionsV1 {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: crate::http_client(timeout),
        }
    }
}

#[async_trait]
impl DirectoryEndpoint for CrnExecutionsV1 {
    fn version(&self) -> &'static str {
        "v1"
    }

    async fn lookup(
        &self,
        node_url: &str,
        instance_id: &str,
    ) -> Result<Option<NetworkAddress>, LookupError> {
        let Some(entry) =
            fetch_execution(&self.client, node_url, "/about/executions/list", instance_id).await?
        else {
            return Ok(None);
        };
        let execution: V1Execution =
            serde_json::from_value(entry).map_err(|e| LookupError::Malformed(e.to_string()))?;
        Ok(execution
            .networking
            .and_then(|n| non_empty(n.ipv6))
            .map(|ip| NetworkAddress::new(strip_prefix_len(&ip), SSH_PORT)))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `2001:db8::1/124` → `2001:db8::1`.
pub(crate) fn strip_prefix_len(ip: &str) -> String {
    ip.split('/').next().unwrap_or(ip).to_string()
}
