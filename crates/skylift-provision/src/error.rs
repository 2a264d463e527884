//! Provisioning error types.

use thiserror::Error;

pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

/// Errors raised while creating an instance. None of them are retried.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("resource profile is empty: every dimension must be non-zero")]
    EmptyProfile,

    #[error("{resource} {requested} exceeds provider limit {limit}")]
    AboveLimit {
        resource: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("{resource} {requested} is below provider minimum {minimum}")]
    BelowMinimum {
        resource: &'static str,
        requested: u64,
        minimum: u64,
    },

    #[error("invalid {which} public key: {reason}")]
    InvalidKey { which: &'static str, reason: String },

    #[error("invalid rootfs {0:?}: use ubuntu22, ubuntu24, debian12 or a 64-char hash")]
    InvalidRootfs(String),

    #[error("automatic provisioning unavailable; create the instance manually: {instructions}")]
    Unavailable { instructions: String },

    #[error("insufficient credits: {details}")]
    InsufficientCredits { details: String },

    #[error("provider rejected instance (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("provider unreachable: {0}")]
    Transport(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}
