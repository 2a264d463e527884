//! The remote executor capability.

use async_trait::async_trait;

use skylift_core::{AutomationCredential, NetworkAddress};

use crate::error::{RemoteExecutionError, RemoteResult};
use crate::shell;

/// Where and as whom a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub address: NetworkAddress,
    pub credential: AutomationCredential,
}

impl RemoteTarget {
    pub fn new(address: NetworkAddress, credential: AutomationCredential) -> Self {
        Self {
            address,
            credential,
        }
    }
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.credential.user, self.address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Bounded tail of stderr, or of stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        if self.stderr.trim().is_empty() {
            shell::tail(&self.stdout)
        } else {
            shell::tail(&self.stderr)
        }
    }
}

/// Runs shell commands on an instance over a transient session.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` and report whatever it produced. Errors only when no
    /// exit status could be obtained (connection, timeout, launch).
    async fn run(&self, target: &RemoteTarget, command: &str) -> RemoteResult<CommandOutput>;

    /// Like [`run`](Self::run) but a non-zero exit is an error carrying
    /// the exit code and a bounded stderr tail.
    async fn execute(&self, target: &RemoteTarget, command: &str) -> RemoteResult<CommandOutput> {
        let output = self.run(target, command).await?;
        if output.success() {
            return Ok(output);
        }
        Err(RemoteExecutionError::NonZeroExit {
            command: shell::label(command),
            exit_code: output.exit_code,
            stdout: shell::tail(&output.stdout),
            stderr: shell::tail(&output.stderr),
        })
    }

    /// Write `content` to `path` on the instance, replacing any previous file.
    async fn upload_text(&self, target: &RemoteTarget, path: &str, content: &str) -> RemoteResult<()> {
        self.execute(target, &shell::write_file_command(path, content))
            .await
            .map(|_| ())
    }
}
