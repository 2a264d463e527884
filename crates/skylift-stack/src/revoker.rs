//! Automation key revocation.
//!
//! Removal and verification run in one remote command: once the key is
//! gone the engine can no longer open a session to check.

use std::sync::Arc;

use tracing::{info, warn};

use skylift_core::{AutomationCredential, NetworkAddress, RevocationStatus};
use skylift_remote::shell::quote;
use skylift_remote::{RemoteExecutor, RemoteTarget};

/// Outcome of one revocation attempt. Never an error: a failure is
/// reported to operators, not propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationResult {
    Revoked,
    Failed { reason: String },
}

impl From<RevocationResult> for RevocationStatus {
    fn from(result: RevocationResult) -> Self {
        match result {
            RevocationResult::Revoked => RevocationStatus::Revoked,
            RevocationResult::Failed { reason } => RevocationStatus::Failed { reason },
        }
    }
}

pub struct CredentialRevoker {
    executor: Arc<dyn RemoteExecutor>,
}

impl CredentialRevoker {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { executor }
    }

    /// Shell command removing every authorized_keys line that carries the
    /// key body, then exiting non-zero if any such line remains. Other
    /// keys, including the user's, are left alone.
    ///
    /// The filtered copy replaces the file only when grep finished cleanly
    /// (status 0 or 1); a write error leaves the original in place. The
    /// final check succeeds only on grep's "no match" status, so an
    /// unreadable file is a failure rather than an absent key.
    fn removal_command(credential: &AutomationCredential) -> String {
        let body = quote(&credential.public_key.body);
        format!(
            "f=\"$HOME/.ssh/authorized_keys\"; t=\"$f.skylift\"; \
             [ -e \"$f\" ] || exit 0; \
             grep -vF {body} \"$f\" > \"$t\"; rc=$?; \
             if [ $rc -gt 1 ]; then rm -f \"$t\"; exit 2; fi; \
             chmod 600 \"$t\" && mv -f \"$t\" \"$f\" || {{ rm -f \"$t\"; exit 2; }}; \
             grep -qF {body} \"$f\"; [ $? -eq 1 ]"
        )
    }

    pub async fn revoke(
        &self,
        address: &NetworkAddress,
        credential: &AutomationCredential,
    ) -> RevocationResult {
        let target = RemoteTarget::new(address.clone(), credential.clone());
        let fingerprint = credential.fingerprint();

        let result = match self
            .executor
            .run(&target, &Self::removal_command(credential))
            .await
        {
            Ok(out) if out.success() => RevocationResult::Revoked,
            Ok(out) => RevocationResult::Failed {
                reason: format!(
                    "key still present or removal failed (exit {}): {}",
                    out.exit_code,
                    out.diagnostic()
                ),
            },
            Err(e) => RevocationResult::Failed {
                reason: e.to_string(),
            },
        };

        match &result {
            RevocationResult::Revoked => {
                info!(%target, %fingerprint, "automation key revoked");
            }
            RevocationResult::Failed { reason } => {
                warn!(
                    %target,
                    %fingerprint,
                    reason = %reason,
                    "automation key revocation failed; remove it manually"
                );
            }
        }
        result
    }
}
