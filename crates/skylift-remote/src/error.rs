use std::time::Duration;

use thiserror::Error;

pub type RemoteResult<T> = Result<T, RemoteExecutionError>;

#[derive(Debug, Error)]
pub enum RemoteExecutionError {
    #[error("could not connect to {target} after {attempts} attempts: {stderr}")]
    ConnectionFailed {
        target: String,
        attempts: u32,
        stderr: String,
    },

    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to launch ssh client: {0}")]
    Spawn(String),
}

impl RemoteExecutionError {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RemoteExecutionError::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
