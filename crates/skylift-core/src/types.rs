//! Domain types shared by every pipeline stage.
//!
//! The `DeploymentRecord` is the only state surfaced to callers. It is
//! written by exactly one orchestration task and read as snapshots by
//! everybody else, so all types here are plain serializable values.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier of a deployment record.
pub type DeploymentId = String;

/// Provider-assigned identifier of a compute instance (message item hash).
pub type InstanceId = String;

// ── Resources ─────────────────────────────────────────────────────

/// Resources requested for a compute instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub vcpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
}

impl ResourceProfile {
    /// True when any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.vcpus == 0 || self.memory_mb == 0 || self.disk_gb == 0
    }

    pub fn disk_mb(&self) -> u64 {
        self.disk_gb * 1024
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vCPU / {} MiB RAM / {} GiB disk",
            self.vcpus, self.memory_mb, self.disk_gb
        )
    }
}

// ── Stack ─────────────────────────────────────────────────────────

/// A compose-style application definition ready to be materialized on
/// an instance. Placeholders have already been rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Project name; also the directory name under the apps root.
    pub project: String,
    /// Compose file contents.
    pub compose: String,
    /// Supporting files, keyed by path relative to the project directory.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

// ── Instance ──────────────────────────────────────────────────────

/// What the provisioner created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub instance_id: InstanceId,
    pub profile: ResourceProfile,
    /// Public keys injected into the instance at creation.
    pub ssh_keys: Vec<String>,
    /// Compute node chosen at creation time, when the provider reports one.
    #[serde(default)]
    pub node_url: Option<String>,
}

/// Reachable SSH endpoint of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub host: String,
    pub port: u16,
}

impl NetworkAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────

/// Lifecycle of a deployment. Strictly forward; `Ready` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentPhase {
    Pending,
    Provisioning,
    AwaitingNetwork,
    DeployingStack,
    Publishing,
    Finalizing,
    Ready,
    Failed,
}

impl DeploymentPhase {
    fn ordinal(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Provisioning => 1,
            Self::AwaitingNetwork => 2,
            Self::DeployingStack => 3,
            Self::Publishing => 4,
            Self::Finalizing => 5,
            Self::Ready => 6,
            Self::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Legal moves: one step forward along the pipeline, a jump to
    /// `Finalizing` from any earlier stage, and `Failed` from any
    /// non-terminal phase. `Ready` is only reachable from `Finalizing`.
    pub fn can_transition_to(self, next: DeploymentPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Ready => self == Self::Finalizing,
            Self::Finalizing => self.ordinal() < Self::Finalizing.ordinal(),
            _ => next.ordinal() == self.ordinal() + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Provisioning => "PROVISIONING",
            Self::AwaitingNetwork => "AWAITING_NETWORK",
            Self::DeployingStack => "DEPLOYING_STACK",
            Self::Publishing => "PUBLISHING",
            Self::Finalizing => "FINALIZING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct PhaseError {
    pub from: DeploymentPhase,
    pub to: DeploymentPhase,
}

// ── Errors surfaced on the record ─────────────────────────────────

/// Fatal failure classes of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Provisioning,
    NetworkTimeout,
    RemoteExecution,
    StackDeploy,
    Tunnel,
}

/// Diagnostic attached to a failed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    /// Phase the deployment was in when the failure happened.
    pub stage: DeploymentPhase,
    pub message: String,
}

/// Outcome of removing the automation key from the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevocationStatus {
    /// Finalization has not run yet.
    NotAttempted,
    /// No session was ever opened, so there was nothing to revoke through.
    Skipped { reason: String },
    Revoked,
    /// The key may still be authorized on the instance; remove it manually.
    Failed { reason: String },
}

// ── Deployment record ─────────────────────────────────────────────

/// Observable state of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    /// Requesting identity (wallet address or account name).
    pub owner: String,
    pub app_id: String,
    pub phase: DeploymentPhase,
    pub instance: Option<InstanceDescriptor>,
    pub address: Option<NetworkAddress>,
    pub public_url: Option<String>,
    pub error: Option<ErrorDetail>,
    pub revocation: RevocationStatus,
    /// Unix timestamp (seconds) when the deploy request was accepted.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last write.
    pub updated_at: u64,
}

impl DeploymentRecord {
    /// Fresh `Pending` record.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, app_id: impl Into<String>) -> Self {
        let now = epoch_secs();
        Self {
            id: id.into(),
            owner: owner.into(),
            app_id: app_id.into(),
            phase: DeploymentPhase::Pending,
            instance: None,
            address: None,
            public_url: None,
            error: None,
            revocation: RevocationStatus::NotAttempted,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing anything but a forward transition.
    pub fn advance(&mut self, next: DeploymentPhase) -> Result<(), PhaseError> {
        if !self.phase.can_transition_to(next) {
            return Err(PhaseError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = epoch_secs();
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// True when the automation key could not be confirmed removed.
    pub fn revocation_failed(&self) -> bool {
        matches!(self.revocation, RevocationStatus::Failed { .. })
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Random deployment identifier (`dep-` + 16 hex chars).
pub fn new_deployment_id() -> DeploymentId {
    let mut bytes = [0u8; 8];
    // Fall back to the clock if the OS source is unavailable; ids only
    // need to be unique within one process.
    if getrandom::getrandom(&mut bytes).is_err() {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        bytes = nanos.to_be_bytes();
    }
    format!("dep-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_moves_forward_one_step() {
        use DeploymentPhase::*;
        assert!(Pending.can_transition_to(Provisioning));
        assert!(Provisioning.can_transition_to(AwaitingNetwork));
        assert!(AwaitingNetwork.can_transition_to(DeployingStack));
        assert!(DeployingStack.can_transition_to(Publishing));
        assert!(Publishing.can_transition_to(Finalizing));
        assert!(Finalizing.can_transition_to(Ready));
    }

    #[test]
    fn no_backwards_or_skipping_moves() {
        use DeploymentPhase::*;
        assert!(!Publishing.can_transition_to(DeployingStack));
        assert!(!Provisioning.can_transition_to(Provisioning));
        assert!(!Pending.can_transition_to(DeployingStack));
        assert!(!Publishing.can_transition_to(Ready));
    }

    #[test]
    fn any_stage_can_jump_to_finalizing_or_failed() {
        use DeploymentPhase::*;
        for phase in [Pending, Provisioning, AwaitingNetwork, DeployingStack, Publishing] {
            assert!(phase.can_transition_to(Finalizing), "{phase}");
            assert!(phase.can_transition_to(Failed), "{phase}");
        }
        assert!(Finalizing.can_transition_to(Failed));
        assert!(!Finalizing.can_transition_to(Finalizing));
    }

    #[test]
    fn terminal_phases_are_final() {
        use DeploymentPhase::*;
        for next in [Pending, Provisioning, Finalizing, Ready, Failed] {
            assert!(!Ready.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn record_advance_rejects_illegal_moves() {
        let mut record = DeploymentRecord::new("dep-1", "0xabc", "nextcloud");
        record.advance(DeploymentPhase::Provisioning).unwrap();
        let err = record.advance(DeploymentPhase::Pending).unwrap_err();
        assert_eq!(err.from, DeploymentPhase::Provisioning);
        assert_eq!(record.phase, DeploymentPhase::Provisioning);
    }

    #[test]
    fn phase_serializes_screaming_snake() {
        let json = serde_json::to_string(&DeploymentPhase::AwaitingNetwork).unwrap();
        assert_eq!(json, "\"AWAITING_NETWORK\"");
    }

    #[test]
    fn revocation_status_is_tagged() {
        let json = serde_json::to_value(RevocationStatus::Failed {
            reason: "session dropped".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "session dropped");
    }

    #[test]
    fn ipv6_address_is_bracketed() {
        assert_eq!(NetworkAddress::new("2a01:240::1", 22).to_string(), "[2a01:240::1]:22");
        assert_eq!(NetworkAddress::new("1.2.3.4", 24001).to_string(), "1.2.3.4:24001");
    }

    #[test]
    fn empty_profile_detection() {
        let profile = ResourceProfile { vcpus: 1, memory_mb: 2048, disk_gb: 0 };
        assert!(profile.is_empty());
        let profile = ResourceProfile { vcpus: 1, memory_mb: 2048, disk_gb: 20 };
        assert!(!profile.is_empty());
        assert_eq!(profile.disk_mb(), 20480);
    }

    #[test]
    fn deployment_ids_are_unique() {
        let a = new_deployment_id();
        let b = new_deployment_id();
        assert!(a.starts_with("dep-"));
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
