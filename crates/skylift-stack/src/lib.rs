//! skylift-stack — the stages that run on the instance itself.
//!
//! All three drive the instance through a [`RemoteExecutor`] and only
//! issue commands that can be repeated safely:
//!
//! - [`StackDeployer`] writes the compose project and brings it up.
//! - [`TunnelPublisher`] starts a quick tunnel and reads back its URL.
//! - [`CredentialRevoker`] removes the automation key from the instance.
//!
//! [`RemoteExecutor`]: skylift_remote::RemoteExecutor

pub mod deployer;
pub mod error;
pub mod revoker;
pub mod tunnel;

pub use deployer::{StackDeployer, StackOutcome, sanitize_project_name};
pub use error::{StackDeployError, StackResult, TunnelError, TunnelResult};
pub use revoker::{CredentialRevoker, RevocationResult};
pub use tunnel::{TunnelPublisher, parse_public_url};
