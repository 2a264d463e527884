//! skylift-remote — run shell operations on a provisioned instance.
//!
//! Every operation opens its own short-lived session and closes it when
//! the command exits; nothing is kept open between pipeline stages.
//! Callers are expected to issue commands that are safe to repeat.

pub mod error;
pub mod executor;
pub mod shell;
pub mod ssh;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{RemoteExecutionError, RemoteResult};
pub use executor::{CommandOutput, RemoteExecutor, RemoteTarget};
pub use ssh::{ConnectRetry, SshExecutor};
