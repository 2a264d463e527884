//! Fallback used when no provider gateway is configured.

use async_trait::async_trait;
use tracing::warn;

use skylift_core::{InstanceDescriptor, ResourceProfile};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::limits::ProviderLimits;
use crate::provisioner::{ProvisionRequest, Provisioner};

const CONSOLE_URL: &str = "https://console.aleph.cloud/computing/instance/new";

/// Validates the request, then fails with instructions for creating the
/// instance by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualProvisioner {
    limits: ProviderLimits,
}

impl ManualProvisioner {
    pub fn new(limits: ProviderLimits) -> Self {
        Self { limits }
    }
}

/// CLI command and console link equivalent to a gateway request.
pub fn manual_instructions(profile: &ResourceProfile) -> String {
    format!(
        "run `aleph instance create --vcpus {} --memory {} --rootfs-size {}` or use {CONSOLE_URL}",
        profile.vcpus,
        profile.memory_mb,
        profile.disk_mb()
    )
}

#[async_trait]
impl Provisioner for ManualProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> ProvisioningResult<InstanceDescriptor> {
        request.validate(&self.limits)?;
        warn!(
            app_id = %request.metadata.app_id,
            profile = %request.profile,
            "no provider gateway configured; manual provisioning required"
        );
        Err(ProvisioningError::Unavailable {
            instructions: manual_instructions(&request.profile),
        })
    }
}
