//! Provider gateway client.
//!
//! Creates a credit-paid instance with a single `POST {api}/instances`
//! and, when the gateway reports the chosen node, asks that node to start
//! the allocation right away. The node notification is best effort: the
//! scheduler starts the instance on its own eventually.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use skylift_core::InstanceDescriptor;
use skylift_core::config::ProviderConfig;

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::limits::ProviderLimits;
use crate::provisioner::{ProvisionRequest, Provisioner};

/// Well-known base images by short name.
const ROOTFS_IMAGES: [(&str, &str); 3] = [
    (
        "ubuntu22",
        "887957042bb0e360da3485ed33175882571f0b716d31e9fce8fb984c48fa77fb",
    ),
    (
        "ubuntu24",
        "77fef271aa6ff9825efa3186ca2e715d19e7108279b817201c69c34cedc74c27",
    ),
    (
        "debian12",
        "6e30de68c6cedfa6b45240c2b51e52495ac6fb1888c60c6e6c7b5ee3d3a8c47e",
    ),
];

/// Resolve a short image name or pass through a 64-char hex hash.
pub fn resolve_rootfs(name: &str) -> ProvisioningResult<String> {
    if let Some((_, hash)) = ROOTFS_IMAGES.iter().find(|(short, _)| *short == name) {
        return Ok((*hash).to_string());
    }
    if name.len() == 64 && name.chars().all(|c| c.is_ascii_hexdigit()) {
        return Ok(name.to_ascii_lowercase());
    }
    Err(ProvisioningError::InvalidRootfs(name.to_string()))
}

#[derive(Debug, Serialize)]
struct CreateInstanceBody<'a> {
    rootfs: &'a str,
    rootfs_size_mb: u64,
    vcpus: u32,
    memory_mb: u64,
    ssh_keys: Vec<String>,
    hypervisor: &'static str,
    channel: &'a str,
    metadata: InstanceMetadata<'a>,
    payment: Payment,
}

#[derive(Debug, Serialize)]
struct InstanceMetadata<'a> {
    name: &'a str,
    app_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Payment {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateInstanceResponse {
    instance_hash: String,
    #[serde(default)]
    node_url: Option<String>,
}

/// Provisions instances through the provider gateway HTTP API.
#[derive(Clone)]
pub struct GatewayProvisioner {
    base_url: String,
    rootfs: String,
    channel: String,
    limits: ProviderLimits,
    client: reqwest::Client,
}

impl GatewayProvisioner {
    pub fn new(base_url: impl Into<String>, config: &ProviderConfig) -> ProvisioningResult<Self> {
        let rootfs = resolve_rootfs(&config.rootfs)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rootfs,
            channel: config.channel.clone(),
            limits: ProviderLimits::from(&config.limits),
            client: http_client(config.request_timeout()),
        })
    }

    fn instances_url(&self) -> String {
        format!("{}/instances", self.base_url)
    }

    /// Ask the hosting node to start the allocation. Failures only warn.
    async fn notify_node(&self, node_url: &str, instance_id: &str) {
        let url = format!(
            "{}/control/allocation/notify",
            normalize_node_url(node_url)
        );
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "instance": instance_id }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(instance_id, node = node_url, "node notified of allocation");
            }
            Ok(resp) => {
                warn!(
                    instance_id,
                    node = node_url,
                    status = resp.status().as_u16(),
                    "node notification rejected; waiting for scheduler start"
                );
            }
            Err(e) => {
                warn!(instance_id, node = node_url, error = %e, "node notification failed");
            }
        }
    }
}

#[async_trait]
impl Provisioner for GatewayProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> ProvisioningResult<InstanceDescriptor> {
        request.validate(&self.limits)?;

        let body = CreateInstanceBody {
            rootfs: &self.rootfs,
            rootfs_size_mb: request.profile.disk_mb(),
            vcpus: request.profile.vcpus,
            memory_mb: request.profile.memory_mb,
            ssh_keys: request.ssh_keys(),
            hypervisor: "qemu",
            channel: &self.channel,
            metadata: InstanceMetadata {
                name: &request.metadata.name,
                app_id: &request.metadata.app_id,
            },
            payment: Payment { kind: "credit" },
        };

        info!(
            app_id = %request.metadata.app_id,
            profile = %request.profile,
            "creating instance"
        );
        let response = self
            .client
            .post(self.instances_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProvisioningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status, text));
        }

        let created: CreateInstanceResponse = response
            .json()
            .await
            .map_err(|e| ProvisioningError::InvalidResponse(e.to_string()))?;
        if created.instance_hash.is_empty() {
            return Err(ProvisioningError::InvalidResponse(
                "empty instance_hash".to_string(),
            ));
        }
        info!(instance_id = %created.instance_hash, "instance created");

        if let Some(node_url) = &created.node_url {
            self.notify_node(node_url, &created.instance_hash).await;
        }

        Ok(InstanceDescriptor {
            instance_id: created.instance_hash,
            profile: request.profile,
            ssh_keys: request.ssh_keys(),
            node_url: created.node_url.map(|u| normalize_node_url(&u)),
        })
    }
}

fn classify_rejection(status: StatusCode, body: String) -> ProvisioningError {
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::PAYMENT_REQUIRED
        || body.contains("InsufficientFunds")
        || lowered.contains("balance")
    {
        return ProvisioningError::InsufficientCredits { details: body };
    }
    ProvisioningError::Rejected {
        status: status.as_u16(),
        body,
    }
}

/// Node URLs are sometimes bare hostnames.
fn normalize_node_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
