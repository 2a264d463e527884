//! Compose stack deployment.
//!
//! The project lives in `{apps_root}/{project}` on the instance. After a
//! successful start the deployer records a digest of everything it
//! uploaded in `.skylift-digest`; a later deploy with the same digest and
//! containers still running is a no-op.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use skylift_core::StackDescriptor;
use skylift_core::config::StackConfig;
use skylift_remote::shell::quote;
use skylift_remote::{RemoteExecutor, RemoteTarget};

use crate::error::{StackDeployError, StackResult};

const COMPOSE_FILE: &str = "docker-compose.yml";
const DIGEST_FILE: &str = ".skylift-digest";
const DOCKER_CHECK: &str = "command -v docker >/dev/null 2>&1 && docker compose version >/dev/null 2>&1";
const DOCKER_INSTALL: &str = "curl -fsSL https://get.docker.com | sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    Deployed,
    /// Same descriptor already up; nothing was changed.
    AlreadyRunning,
}

/// Validate a project name for use as a directory and compose project.
pub fn sanitize_project_name(name: &str) -> StackResult<&str> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(StackDeployError::InvalidProject(name.to_string()))
    }
}

/// Supporting files must stay inside the project directory.
fn check_file_path(path: &str) -> StackResult<()> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && path.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        });
    if valid {
        Ok(())
    } else {
        Err(StackDeployError::InvalidFile(path.to_string()))
    }
}

/// Digest over the compose text and every supporting file.
fn stack_digest(stack: &StackDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stack.compose.as_bytes());
    for (path, content) in &stack.files {
        hasher.update([0u8]);
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub struct StackDeployer {
    executor: Arc<dyn RemoteExecutor>,
    apps_root: String,
}

impl StackDeployer {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &StackConfig) -> Self {
        Self {
            executor,
            apps_root: config.apps_root.trim_end_matches('/').to_string(),
        }
    }

    pub fn project_dir(&self, project: &str) -> String {
        format!("{}/{project}", self.apps_root)
    }

    /// Materialize `stack` on the instance and start its containers.
    pub async fn deploy(
        &self,
        target: &RemoteTarget,
        stack: &StackDescriptor,
    ) -> StackResult<StackOutcome> {
        let project = sanitize_project_name(&stack.project)?;
        for path in stack.files.keys() {
            check_file_path(path)?;
        }
        let dir = self.project_dir(project);
        let digest = stack_digest(stack);

        if self.is_current(target, &dir, &digest).await? {
            info!(%target, project, "stack already running with identical descriptor");
            return Ok(StackOutcome::AlreadyRunning);
        }

        self.upload(target, &format!("{dir}/{COMPOSE_FILE}"), &stack.compose)
            .await?;
        for (path, content) in &stack.files {
            self.upload(target, &format!("{dir}/{path}"), content).await?;
        }
        debug!(%target, project, files = stack.files.len() + 1, "stack files uploaded");

        self.ensure_docker(target).await?;

        let qdir = quote(&dir);
        let pull = self
            .executor
            .run(target, &format!("cd {qdir} && docker compose pull"))
            .await?;
        if !pull.success() {
            return Err(StackDeployError::Pull {
                exit_code: pull.exit_code,
                output: pull.diagnostic(),
            });
        }

        let up = self
            .executor
            .run(
                target,
                &format!("cd {qdir} && docker compose up -d --remove-orphans"),
            )
            .await?;
        if !up.success() {
            return Err(StackDeployError::Start {
                exit_code: up.exit_code,
                output: up.diagnostic(),
            });
        }

        self.upload(target, &format!("{dir}/{DIGEST_FILE}"), &digest)
            .await?;
        info!(%target, project, "stack started");
        Ok(StackOutcome::Deployed)
    }

    async fn upload(&self, target: &RemoteTarget, path: &str, content: &str) -> StackResult<()> {
        self.executor
            .upload_text(target, path, content)
            .await
            .map_err(|source| StackDeployError::Upload {
                path: path.to_string(),
                source,
            })
    }

    /// True when the recorded digest matches and containers are running.
    async fn is_current(&self, target: &RemoteTarget, dir: &str, digest: &str) -> StackResult<bool> {
        let recorded = self
            .executor
            .run(target, &format!("cat {}", quote(&format!("{dir}/{DIGEST_FILE}"))))
            .await?;
        if !recorded.success() || recorded.stdout.trim() != digest {
            return Ok(false);
        }
        let ps = self
            .executor
            .run(
                target,
                &format!(
                    "cd {} && docker compose ps --status running --quiet | wc -l",
                    quote(dir)
                ),
            )
            .await?;
        let running: usize = ps.stdout.trim().parse().unwrap_or(0);
        Ok(ps.success() && running > 0)
    }

    async fn ensure_docker(&self, target: &RemoteTarget) -> StackResult<()> {
        if self.executor.run(target, DOCKER_CHECK).await?.success() {
            return Ok(());
        }
        info!(%target, "docker not found, installing");
        let install = self.executor.run(target, DOCKER_INSTALL).await?;
        if !install.success() {
            return Err(StackDeployError::DockerInstall {
                exit_code: install.exit_code,
                output: install.diagnostic(),
            });
        }
        Ok(())
    }
}
