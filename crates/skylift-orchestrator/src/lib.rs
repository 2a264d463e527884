//! skylift-orchestrator — drives one deployment from request to tunnel.
//!
//! [`DeploymentService`] is the entry point for collaborators: it accepts
//! deploy requests, creates the record and spawns one [`Orchestrator`]
//! task per deployment. That task is the only writer of its record and
//! runs until the record is terminal or the process exits; there is no
//! cancellation and nothing is resumed after a restart.

pub mod error;
pub mod orchestrator;
pub mod service;

pub use error::{DeployError, ServiceError, ServiceResult};
pub use orchestrator::{DeploymentJob, Orchestrator, SESSION_PROBE};
pub use service::{DeploymentService, StartedDeployment};
