use thiserror::Error;

use skylift_remote::RemoteExecutionError;

pub type StackResult<T> = Result<T, StackDeployError>;
pub type TunnelResult<T> = Result<T, TunnelError>;

#[derive(Debug, Error)]
pub enum StackDeployError {
    #[error("invalid project name {0:?}: use 1-64 of [A-Za-z0-9_-]")]
    InvalidProject(String),

    #[error("invalid supporting file path {0:?}")]
    InvalidFile(String),

    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        source: RemoteExecutionError,
    },

    #[error("docker installation failed (exit {exit_code}): {output}")]
    DockerInstall { exit_code: i32, output: String },

    #[error("image pull failed (exit {exit_code}): {output}")]
    Pull { exit_code: i32, output: String },

    #[error("container start failed (exit {exit_code}): {output}")]
    Start { exit_code: i32, output: String },

    #[error(transparent)]
    Remote(#[from] RemoteExecutionError),
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel agent installation failed (exit {exit_code}): {output}")]
    Install { exit_code: i32, output: String },

    #[error("tunnel agent failed to start (exit {exit_code}): {output}")]
    Start { exit_code: i32, output: String },

    #[error("tunnel agent reported an error: {line}")]
    AgentFailed { line: String },

    #[error("no public URL in tunnel agent output after {attempts} polls; last output: {log_tail:?}")]
    UrlNotFound { attempts: u32, log_tail: String },

    #[error(transparent)]
    Remote(#[from] RemoteExecutionError),
}
