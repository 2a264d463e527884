//! Provisioner capability and request type.

use async_trait::async_trait;

use skylift_core::{InstanceDescriptor, PublicKey, ResourceProfile};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::limits::ProviderLimits;

/// Descriptive metadata attached to the created instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMetadata {
    pub app_id: String,
    /// Human-readable instance name shown in the provider console.
    pub name: String,
}

/// Everything needed to create one instance.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub profile: ResourceProfile,
    pub metadata: StackMetadata,
    /// The end user's key; stays on the instance for good.
    pub user_public_key: String,
    /// The engine's transient key; removed again once the stack is live.
    pub automation_public_key: String,
}

impl ProvisionRequest {
    /// Check the profile against `limits` and both keys for syntax.
    pub fn validate(&self, limits: &ProviderLimits) -> ProvisioningResult<()> {
        limits.validate(&self.profile)?;
        PublicKey::parse(&self.user_public_key).map_err(|e| ProvisioningError::InvalidKey {
            which: "user",
            reason: e.to_string(),
        })?;
        PublicKey::parse(&self.automation_public_key).map_err(|e| {
            ProvisioningError::InvalidKey {
                which: "automation",
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    /// Both keys in the order they are installed on the instance.
    pub fn ssh_keys(&self) -> Vec<String> {
        vec![
            self.user_public_key.trim().to_string(),
            self.automation_public_key.trim().to_string(),
        ]
    }
}

/// Creates compute instances. Implementations must reject invalid
/// requests before any network call, and must never retry a failed
/// creation on their own.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, request: &ProvisionRequest) -> ProvisioningResult<InstanceDescriptor>;
}
