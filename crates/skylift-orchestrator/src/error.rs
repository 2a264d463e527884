use thiserror::Error;

use skylift_core::{CredentialError, ErrorKind};
use skylift_network::NetworkError;
use skylift_provision::ProvisioningError;
use skylift_remote::RemoteExecutionError;
use skylift_stack::{StackDeployError, TunnelError};
use skylift_state::StateError;

/// A fatal failure in one pipeline stage.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("remote session failed: {0}")]
    Remote(#[from] RemoteExecutionError),

    #[error("stack deployment failed: {0}")]
    Stack(#[from] StackDeployError),

    #[error("tunnel publishing failed: {0}")]
    Tunnel(#[from] TunnelError),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Provisioning(_) => ErrorKind::Provisioning,
            DeployError::Network(_) => ErrorKind::NetworkTimeout,
            DeployError::Remote(_) => ErrorKind::RemoteExecution,
            DeployError::Stack(_) => ErrorKind::StackDeploy,
            DeployError::Tunnel(_) => ErrorKind::Tunnel,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors returned synchronously to callers of the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("invalid ssh public key: {0}")]
    InvalidUserKey(String),

    #[error("deployment not found: {0}")]
    NotFound(String),

    #[error("automation credential unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    State(#[from] StateError),
}
