//! Provider resource limits.

use skylift_core::ResourceProfile;
use skylift_core::config::ProviderLimitsConfig;

use crate::error::{ProvisioningError, ProvisioningResult};

/// Bounds a requested profile must fall within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderLimits {
    pub max_vcpus: u32,
    pub min_memory_mb: u64,
    pub max_memory_mb: u64,
    pub min_disk_gb: u64,
    pub max_disk_gb: u64,
}

impl Default for ProviderLimits {
    fn default() -> Self {
        Self::from(&ProviderLimitsConfig::default())
    }
}

impl From<&ProviderLimitsConfig> for ProviderLimits {
    fn from(config: &ProviderLimitsConfig) -> Self {
        Self {
            max_vcpus: config.max_vcpus,
            min_memory_mb: config.min_memory_mb,
            max_memory_mb: config.max_memory_mb,
            min_disk_gb: config.min_disk_gb,
            max_disk_gb: config.max_disk_gb,
        }
    }
}

impl ProviderLimits {
    /// Check `profile` without touching the network.
    pub fn validate(&self, profile: &ResourceProfile) -> ProvisioningResult<()> {
        if profile.is_empty() {
            return Err(ProvisioningError::EmptyProfile);
        }
        check_max("vcpus", u64::from(profile.vcpus), u64::from(self.max_vcpus))?;
        check_min("memory_mb", profile.memory_mb, self.min_memory_mb)?;
        check_max("memory_mb", profile.memory_mb, self.max_memory_mb)?;
        check_min("disk_gb", profile.disk_gb, self.min_disk_gb)?;
        check_max("disk_gb", profile.disk_gb, self.max_disk_gb)?;
        Ok(())
    }
}

fn check_max(resource: &'static str, requested: u64, limit: u64) -> ProvisioningResult<()> {
    if requested > limit {
        return Err(ProvisioningError::AboveLimit {
            resource,
            requested,
            limit,
        });
    }
    Ok(())
}

fn check_min(resource: &'static str, requested: u64, minimum: u64) -> ProvisioningResult<()> {
    if requested < minimum {
        return Err(ProvisioningError::BelowMinimum {
            resource,
            requested,
            minimum,
        });
    }
    Ok(())
}
