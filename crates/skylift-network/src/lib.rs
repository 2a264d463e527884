//! skylift-network — learn where a freshly created instance can be reached.
//!
//! Resolution is a bounded polling loop. Each attempt asks the scheduler
//! which node the instance was allocated to, then walks an ordered list of
//! node-directory strategies (newest API first) for the instance's
//! address. A strategy that reports the endpoint as unsupported hands over
//! to the next one; any other failure ends the attempt.

pub mod directory;
pub mod error;
pub mod resolver;
pub mod scheduler;

pub use directory::{CrnExecutionsV1, CrnExecutionsV2, DirectoryEndpoint, LookupError};
pub use error::{NetworkError, NetworkResult};
pub use resolver::{AddressResolver, NetworkResolver, PollPolicy};
pub use scheduler::{Allocation, AllocationSource, SchedulerApi};

pub(crate) fn http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
