use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// The polling window closed without a reachable address. The
    /// instance itself may still come up later.
    #[error(
        "no network address for instance {instance_id} after {attempts} attempts (last: {last_error})"
    )]
    Timeout {
        instance_id: String,
        attempts: u32,
        last_error: String,
    },
}
