//! Per-deployment state machine.
//!
//! ```text
//! PENDING → PROVISIONING → AWAITING_NETWORK → DEPLOYING_STACK → PUBLISHING
//!         → FINALIZING → READY
//! ```
//!
//! A failure in any stage records an [`ErrorDetail`] and jumps to
//! FINALIZING, which revokes the automation key whenever a session was
//! ever opened, before settling in FAILED. Stages are never re-entered and
//! nothing is retried across stage boundaries.

use std::sync::Arc;

use tracing::{error, info, warn};

use skylift_core::config::SkyliftConfig;
use skylift_core::{
    AppTemplate, AutomationCredential, DeploymentPhase, DeploymentRecord, ErrorDetail,
    RevocationStatus, StackDescriptor,
};
use skylift_network::AddressResolver;
use skylift_provision::{ProvisionRequest, Provisioner, StackMetadata};
use skylift_remote::{RemoteExecutor, RemoteTarget};
use skylift_stack::{CredentialRevoker, StackDeployer, TunnelPublisher};
use skylift_state::DeploymentRepository;

use crate::error::DeployError;

/// Trivial command whose success marks the first established session.
pub const SESSION_PROBE: &str = "echo connected";

/// Inputs of one deployment, fixed before the task starts.
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub template: AppTemplate,
    /// Rendered descriptor; generated secrets are already filled in.
    pub stack: StackDescriptor,
    pub user_public_key: String,
    pub credential: AutomationCredential,
}

pub struct Orchestrator {
    repo: Arc<dyn DeploymentRepository>,
    provisioner: Arc<dyn Provisioner>,
    resolver: Arc<dyn AddressResolver>,
    executor: Arc<dyn RemoteExecutor>,
    stack: StackDeployer,
    tunnel: TunnelPublisher,
    revoker: CredentialRevoker,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn DeploymentRepository>,
        provisioner: Arc<dyn Provisioner>,
        resolver: Arc<dyn AddressResolver>,
        executor: Arc<dyn RemoteExecutor>,
        config: &SkyliftConfig,
    ) -> Self {
        Self {
            stack: StackDeployer::new(executor.clone(), &config.stack),
            tunnel: TunnelPublisher::new(executor.clone(), &config.tunnel),
            revoker: CredentialRevoker::new(executor.clone()),
            repo,
            provisioner,
            resolver,
            executor,
        }
    }

    /// Drive `record` to a terminal phase and return its final state.
    pub async fn run(&self, mut record: DeploymentRecord, job: DeploymentJob) -> DeploymentRecord {
        let mut session_opened = false;
        let outcome = self.drive(&mut record, &job, &mut session_opened).await;

        if let Err(e) = &outcome {
            error!(
                deployment_id = %record.id,
                stage = %record.phase,
                error = %e,
                "deployment stage failed"
            );
            record.error = Some(ErrorDetail {
                kind: e.kind(),
                stage: record.phase,
                message: e.to_string(),
            });
        }

        self.transition(&mut record, DeploymentPhase::Finalizing);
        record.revocation = self.finalize(&record, &job, session_opened).await;

        let terminal = if outcome.is_ok() {
            DeploymentPhase::Ready
        } else {
            DeploymentPhase::Failed
        };
        self.transition(&mut record, terminal);
        record
    }

    async fn drive(
        &self,
        record: &mut DeploymentRecord,
        job: &DeploymentJob,
        session_opened: &mut bool,
    ) -> Result<(), DeployError> {
        self.transition(record, DeploymentPhase::Provisioning);
        let request = ProvisionRequest {
            profile: job.template.requirements,
            metadata: StackMetadata {
                app_id: job.template.id.clone(),
                name: format!("skylift-{}-{}", job.template.id, record.id),
            },
            user_public_key: job.user_public_key.clone(),
            automation_public_key: job.credential.public_key.to_string(),
        };
        let instance = self.provisioner.provision(&request).await?;
        let instance_id = instance.instance_id.clone();
        record.instance = Some(instance);

        self.transition(record, DeploymentPhase::AwaitingNetwork);
        let address = self.resolver.resolve(&instance_id).await?;
        record.address = Some(address.clone());

        self.transition(record, DeploymentPhase::DeployingStack);
        let target = RemoteTarget::new(address, job.credential.clone());
        self.executor.execute(&target, SESSION_PROBE).await?;
        *session_opened = true;
        info!(deployment_id = %record.id, %target, "remote session established");
        self.stack.deploy(&target, &job.stack).await?;

        self.transition(record, DeploymentPhase::Publishing);
        let url = self.tunnel.publish(&target, job.template.port).await?;
        record.public_url = Some(url);
        Ok(())
    }

    /// Revoke the automation key if any session ever reached the instance.
    async fn finalize(
        &self,
        record: &DeploymentRecord,
        job: &DeploymentJob,
        session_opened: bool,
    ) -> RevocationStatus {
        let address = match (&record.address, session_opened) {
            (Some(address), true) => address,
            _ => {
                info!(deployment_id = %record.id, "no session was opened; revocation skipped");
                return RevocationStatus::Skipped {
                    reason: "no remote session was ever established".to_string(),
                };
            }
        };
        let status: RevocationStatus = self.revoker.revoke(address, &job.credential).await.into();
        if let RevocationStatus::Failed { reason } = &status {
            warn!(
                deployment_id = %record.id,
                fingerprint = %job.credential.fingerprint(),
                reason = %reason,
                "automation key may still be authorized on the instance"
            );
        }
        status
    }

    /// Advance and persist. Write failures are logged; the task carries on
    /// with its in-memory copy.
    fn transition(&self, record: &mut DeploymentRecord, next: DeploymentPhase) {
        let from = record.phase;
        if let Err(e) = record.advance(next) {
            error!(deployment_id = %record.id, error = %e, "rejected lifecycle transition");
            return;
        }
        info!(deployment_id = %record.id, %from, to = %next, "deployment phase changed");
        if let Err(e) = self.repo.put(record) {
            error!(deployment_id = %record.id, error = %e, "failed to persist deployment record");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use skylift_core::{ErrorKind, NetworkAddress, ResourceProfile};
    use skylift_provision::ManualProvisioner;
    use skylift_remote::testing::{Reply, ScriptedExecutor};
    use skylift_state::{StateResult, StateStore};
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    /// Store wrapper remembering the phase of every write.
    struct Recording {
        inner: StateStore,
        phases: Mutex<Vec<DeploymentPhase>>,
    }

    impl DeploymentRepository for Recording {
        fn get(&self, id: &str) -> StateResult<Option<DeploymentRecord>> {
            self.inner.get(id)
        }

        fn put(&self, record: &DeploymentRecord) -> StateResult<()> {
            self.phases.lock().unwrap().push(record.phase);
            self.inner.put(record)
        }

        fn list(&self) -> StateResult<Vec<DeploymentRecord>> {
            self.inner.list()
        }
    }

    struct Harness {
        repo: Arc<Recording>,
        provisioner: Arc<FakeProvisioner>,
        resolver: Arc<FakeResolver>,
        orchestrator: Orchestrator,
    }

    fn harness(executor: Arc<dyn RemoteExecutor>, address: Option<NetworkAddress>) -> Harness {
        let repo = Arc::new(Recording {
            inner: StateStore::open_in_memory().unwrap(),
            phases: Mutex::new(Vec::new()),
        });
        let provisioner = Arc::new(FakeProvisioner::default());
        let resolver = Arc::new(FakeResolver::new(address));
        let orchestrator = Orchestrator::new(
            repo.clone(),
            provisioner.clone(),
            resolver.clone(),
            executor,
            &test_config(),
        );
        Harness {
            repo,
            provisioner,
            resolver,
            orchestrator,
        }
    }

    async fn run(h: &Harness, job: DeploymentJob) -> DeploymentRecord {
        let record = DeploymentRecord::new("dep-test", "0xabc", "uptime-kuma");
        h.repo.put(&record).unwrap();
        h.orchestrator.run(record, job).await
    }

    // ── Scenarios ────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_reaches_ready() {
        let exec = Arc::new(healthy_host());
        let h = harness(exec.clone(), reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Ready);
        assert_eq!(record.public_url.as_deref(), Some("https://calm-lake-42.trycloudflare.com"));
        assert!(record.error.is_none());
        assert_eq!(record.revocation, RevocationStatus::Revoked);
        assert_eq!(record.instance.as_ref().unwrap().ssh_keys.len(), 2);
        assert_eq!(h.repo.get("dep-test").unwrap(), Some(record));

        // Revocation is the last thing that touches the instance.
        let commands = exec.commands();
        assert_eq!(commands.first().map(String::as_str), Some(SESSION_PROBE));
        assert!(commands.last().unwrap().contains("authorized_keys"));
    }

    #[tokio::test]
    async fn phases_are_strictly_forward_and_persisted() {
        let h = harness(Arc::new(healthy_host()), reachable());
        run(&h, job(small())).await;

        use DeploymentPhase::*;
        assert_eq!(
            *h.repo.phases.lock().unwrap(),
            vec![
                Pending,
                Provisioning,
                AwaitingNetwork,
                DeployingStack,
                Publishing,
                Finalizing,
                Ready
            ]
        );
    }

    #[tokio::test]
    async fn network_timeout_fails_without_revocation() {
        let exec = Arc::new(healthy_host());
        let h = harness(exec.clone(), None);

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Failed);
        let detail = record.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::NetworkTimeout);
        assert_eq!(detail.stage, DeploymentPhase::AwaitingNetwork);
        assert!(detail.message.contains("30 attempts"));
        assert!(matches!(record.revocation, RevocationStatus::Skipped { .. }));
        assert!(exec.commands().is_empty());

        use DeploymentPhase::*;
        assert_eq!(
            *h.repo.phases.lock().unwrap(),
            vec![Pending, Provisioning, AwaitingNetwork, Finalizing, Failed]
        );
    }

    #[tokio::test]
    async fn over_limit_profile_fails_before_network_resolution() {
        let h = harness(Arc::new(healthy_host()), reachable());
        let huge = ResourceProfile {
            vcpus: 128,
            memory_mb: 2048,
            disk_gb: 20,
        };

        let record = run(&h, job(huge)).await;

        assert_eq!(record.phase, DeploymentPhase::Failed);
        assert_eq!(record.error.unwrap().kind, ErrorKind::Provisioning);
        assert!(record.instance.is_none());
        assert_eq!(h.provisioner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn manual_provisioning_surfaces_instructions() {
        let repo = Arc::new(StateStore::open_in_memory().unwrap());
        let orchestrator = Orchestrator::new(
            repo,
            Arc::new(ManualProvisioner::default()),
            Arc::new(FakeResolver::new(reachable())),
            Arc::new(healthy_host()),
            &test_config(),
        );
        let record = orchestrator
            .run(DeploymentRecord::new("dep-m", "0xabc", "uptime-kuma"), job(small()))
            .await;

        let detail = record.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::Provisioning);
        assert!(detail.message.contains("aleph instance create --vcpus 1"));
    }

    #[tokio::test]
    async fn tunnel_failure_still_revokes() {
        let exec = Arc::new(
            ScriptedExecutor::new().on("cat /tmp/skylift-tunnel", Reply::ok("INF Starting tunnel\n")),
        );
        let h = harness(exec.clone(), reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Failed);
        let detail = record.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::Tunnel);
        assert_eq!(detail.stage, DeploymentPhase::Publishing);
        assert!(detail.message.contains("no public URL"));
        assert!(record.public_url.is_none());
        assert_eq!(record.revocation, RevocationStatus::Revoked);
        assert_eq!(exec.count("authorized_keys"), 1);
    }

    #[tokio::test]
    async fn stack_failure_still_revokes() {
        let exec = Arc::new(
            healthy_host().on("docker compose up", Reply::fail(1, "port is already allocated")),
        );
        let h = harness(exec.clone(), reachable());

        let record = run(&h, job(small())).await;

        let detail = record.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::StackDeploy);
        assert_eq!(detail.stage, DeploymentPhase::DeployingStack);
        assert!(detail.message.contains("exit 1"));
        assert_eq!(record.revocation, RevocationStatus::Revoked);
        assert_eq!(exec.count("cloudflared"), 0);
    }

    #[tokio::test]
    async fn unreachable_instance_skips_revocation() {
        let exec = Arc::new(healthy_host().on(SESSION_PROBE, Reply::Drop));
        let h = harness(exec.clone(), reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Failed);
        let detail = record.error.unwrap();
        assert_eq!(detail.kind, ErrorKind::RemoteExecution);
        assert_eq!(detail.stage, DeploymentPhase::DeployingStack);
        assert!(matches!(record.revocation, RevocationStatus::Skipped { .. }));
        assert_eq!(exec.count("authorized_keys"), 0);
    }

    #[tokio::test]
    async fn revocation_failure_does_not_change_success() {
        let exec = Arc::new(healthy_host().on("authorized_keys", Reply::Drop));
        let h = harness(exec, reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Ready);
        assert!(record.error.is_none());
        assert!(record.public_url.is_some());
        assert!(record.revocation_failed());
    }

    #[tokio::test]
    async fn revocation_failure_does_not_change_failure() {
        let exec = Arc::new(
            ScriptedExecutor::new()
                .on("cat /tmp/skylift-tunnel", Reply::ok("garbage\n"))
                .on("authorized_keys", Reply::fail(1, "Permission denied")),
        );
        let h = harness(exec, reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Failed);
        assert_eq!(record.error.as_ref().unwrap().kind, ErrorKind::Tunnel);
        assert!(record.revocation_failed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refused_sessions_are_absorbed_by_connect_retry() {
        use skylift_remote::{ConnectRetry, SshExecutor};
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().display();
        let script = format!(
            "#!/bin/sh\n\
             n=$(cat '{d}/count' 2>/dev/null || echo 0)\n\
             n=$((n+1))\n\
             echo $n > '{d}/count'\n\
             if [ $n -le 2 ]; then echo 'ssh: connect to host: Connection refused' >&2; exit 255; fi\n\
             for a in \"$@\"; do last=\"$a\"; done\n\
             case \"$last\" in\n\
             'cat /tmp/skylift-tunnel'*) echo 'INF |  https://calm-lake-42.trycloudflare.com  |' ;;\n\
             esac\n\
             exit 0\n"
        );
        let program = dir.path().join("ssh");
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ssh = SshExecutor::new(
            program.display().to_string(),
            ConnectRetry {
                attempts: 5,
                initial_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
            Duration::from_secs(5),
            Duration::from_secs(10),
        );
        let h = harness(Arc::new(ssh), reachable());

        let record = run(&h, job(small())).await;

        assert_eq!(record.phase, DeploymentPhase::Ready);
        assert!(record.error.is_none());
        assert_eq!(record.public_url.as_deref(), Some("https://calm-lake-42.trycloudflare.com"));
        assert_eq!(record.revocation, RevocationStatus::Revoked);
    }
}
