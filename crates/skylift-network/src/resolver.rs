//! Polling resolver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use skylift_core::NetworkAddress;
use skylift_core::config::NetworkConfig;

use crate::directory::{
    CrnExecutionsV1, CrnExecutionsV2, DirectoryEndpoint, SSH_PORT, strip_prefix_len,
};
use crate::error::{NetworkError, NetworkResult};
use crate::scheduler::{AllocationSource, SchedulerApi};

/// Fixed-interval polling budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

/// Turns an instance id into a reachable address, or times out.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, instance_id: &str) -> NetworkResult<NetworkAddress>;
}

/// Outcome of one polling round.
enum Attempt {
    Resolved(NetworkAddress),
    Pending(String),
}

pub struct NetworkResolver {
    scheduler: Arc<dyn AllocationSource>,
    /// Newest API first.
    directory: Vec<Arc<dyn DirectoryEndpoint>>,
    policy: PollPolicy,
}

impl NetworkResolver {
    pub fn new(
        scheduler: Arc<dyn AllocationSource>,
        directory: Vec<Arc<dyn DirectoryEndpoint>>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            scheduler,
            directory,
            policy,
        }
    }

    /// Scheduler API plus the v2 → v1 directory chain, tuned by `config`.
    pub fn from_config(config: &NetworkConfig) -> Self {
        let timeout = config.request_timeout();
        Self::new(
            Arc::new(SchedulerApi::new(&config.scheduler_url, timeout)),
            vec![
                Arc::new(CrnExecutionsV2::new(timeout)),
                Arc::new(CrnExecutionsV1::new(timeout)),
            ],
            PollPolicy {
                attempts: config.attempts,
                interval: config.interval(),
            },
        )
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    async fn attempt(&self, instance_id: &str) -> Attempt {
        let allocation = match self.scheduler.allocation(instance_id).await {
            Ok(Some(allocation)) => allocation,
            Ok(None) => return Attempt::Pending("not yet scheduled".to_string()),
            Err(e) => return Attempt::Pending(format!("scheduler: {e}")),
        };

        for endpoint in &self.directory {
            match endpoint.lookup(&allocation.node_url, instance_id).await {
                Ok(Some(address)) => return Attempt::Resolved(address),
                Ok(None) => {
                    return Attempt::Pending(format!(
                        "{} directory on {} has no address yet",
                        endpoint.version(),
                        allocation.node_url
                    ));
                }
                Err(e) if e.is_unsupported() => {
                    debug!(
                        instance_id,
                        node = %allocation.node_url,
                        version = endpoint.version(),
                        "directory endpoint unsupported, falling back"
                    );
                }
                Err(e) => {
                    return Attempt::Pending(format!(
                        "{} directory on {}: {e}",
                        endpoint.version(),
                        allocation.node_url
                    ));
                }
            }
        }
        // Nodes too old for any directory version: use the scheduler's own
        // view of the VM address.
        if let Some(ip) = allocation.vm_ipv6.as_deref().filter(|ip| !ip.trim().is_empty()) {
            let address = NetworkAddress::new(strip_prefix_len(ip), SSH_PORT);
            debug!(
                instance_id,
                node = %allocation.node_url,
                node_id = allocation.node_id.as_deref().unwrap_or("-"),
                %address,
                "no directory endpoint supported, using scheduler vm_ipv6"
            );
            return Attempt::Resolved(address);
        }
        Attempt::Pending(format!(
            "no supported directory endpoint on {}",
            allocation.node_url
        ))
    }
}

#[async_trait]
impl AddressResolver for NetworkResolver {
    async fn resolve(&self, instance_id: &str) -> NetworkResult<NetworkAddress> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            match self.attempt(instance_id).await {
                Attempt::Resolved(address) => {
                    info!(instance_id, %address, attempt, "instance address resolved");
                    return Ok(address);
                }
                Attempt::Pending(reason) => {
                    debug!(instance_id, attempt, attempts, reason = %reason, "address not available");
                    last_error = reason;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.interval).await;
            }
        }

        warn!(instance_id, attempts, last_error = %last_error, "address resolution timed out");
        Err(NetworkError::Timeout {
            instance_id: instance_id.to_string(),
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LookupError;
    use crate::scheduler::Allocation;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Scheduler that reports "not scheduled" for the first `pending`
    /// calls and a fixed node afterwards.
    struct FakeScheduler {
        calls: AtomicUsize,
        pending: usize,
        vm_ipv6: Option<String>,
    }

    impl FakeScheduler {
        fn after(pending: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                pending,
                vm_ipv6: None,
            })
        }

        fn with_vm_ipv6(ip: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                pending: 0,
                vm_ipv6: Some(ip.to_string()),
            })
        }

        fn never() -> Arc<Self> {
            Self::after(usize::MAX)
        }
    }

    #[async_trait]
    impl AllocationSource for FakeScheduler {
        async fn allocation(&self, _: &str) -> Result<Option<Allocation>, LookupError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.pending {
                return Ok(None);
            }
            Ok(Some(Allocation {
                node_url: "http://node.test".to_string(),
                node_id: Some("node-1".to_string()),
                vm_ipv6: self.vm_ipv6.clone(),
            }))
        }
    }

    /// Directory endpoint replaying scripted results; the last one repeats.
    struct Scripted {
        version: &'static str,
        calls: AtomicUsize,
        script: Mutex<VecDeque<Result<Option<NetworkAddress>, LookupError>>>,
    }

    impl Scripted {
        fn new(
            version: &'static str,
            script: Vec<Result<Option<NetworkAddress>, LookupError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                version,
                calls: AtomicUsize::new(0),
                script: Mutex::new(script.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DirectoryEndpoint for Scripted {
        fn version(&self) -> &'static str {
            self.version
        }

        async fn lookup(&self, _: &str, _: &str) -> Result<Option<NetworkAddress>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn addr() -> NetworkAddress {
        NetworkAddress::new("203.0.113.7", 24022)
    }

    fn policy(attempts: u32, millis: u64) -> PollPolicy {
        PollPolicy {
            attempts,
            interval: Duration::from_millis(millis),
        }
    }

    #[tokio::test]
    async fn makes_exactly_n_attempts_then_times_out() {
        let scheduler = FakeScheduler::never();
        let resolver = NetworkResolver::new(scheduler.clone(), vec![], policy(4, 20));

        let started = Instant::now();
        let err = resolver.resolve("inst-a").await.unwrap_err();

        assert_eq!(scheduler.calls.load(Ordering::SeqCst), 4);
        // Three sleeps between four attempts, none after the last.
        assert!(started.elapsed() >= Duration::from_millis(60));
        let NetworkError::Timeout {
            attempts,
            last_error,
            ..
        } = err;
        assert_eq!(attempts, 4);
        assert_eq!(last_error, "not yet scheduled");
    }

    #[tokio::test]
    async fn returns_on_first_success() {
        let scheduler = FakeScheduler::after(2);
        let v2 = Scripted::new("v2", vec![Ok(Some(addr()))]);
        let resolver = NetworkResolver::new(scheduler.clone(), vec![v2.clone()], policy(30, 1));

        assert_eq!(resolver.resolve("inst-a").await.unwrap(), addr());
        assert_eq!(scheduler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(v2.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_falls_back_every_round() {
        let v2 = Scripted::new("v2", vec![Err(LookupError::Unsupported(404))]);
        let v1 = Scripted::new("v1", vec![Ok(None), Ok(None), Ok(Some(addr()))]);
        let resolver = NetworkResolver::new(
            FakeScheduler::after(0),
            vec![v2.clone(), v1.clone()],
            policy(5, 1),
        );

        assert_eq!(resolver.resolve("inst-a").await.unwrap(), addr());
        assert_eq!(v2.calls(), 3);
        assert_eq!(v1.calls(), 3);
    }

    #[tokio::test]
    async fn generic_errors_do_not_fall_back() {
        let v2 = Scripted::new("v2", vec![Err(LookupError::Transport("refused".into()))]);
        let v1 = Scripted::new("v1", vec![Ok(Some(addr()))]);
        let resolver = NetworkResolver::new(
            FakeScheduler::after(0),
            vec![v2.clone(), v1.clone()],
            policy(3, 1),
        );

        let err = resolver.resolve("inst-a").await.unwrap_err();
        assert_eq!(v2.calls(), 3);
        assert_eq!(v1.calls(), 0);
        assert!(err.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn transient_directory_error_counts_toward_budget() {
        let v2 = Scripted::new(
            "v2",
            vec![Err(LookupError::Status(502)), Ok(Some(addr()))],
        );
        let resolver =
            NetworkResolver::new(FakeScheduler::after(0), vec![v2.clone()], policy(3, 1));

        assert_eq!(resolver.resolve("inst-a").await.unwrap(), addr());
        assert_eq!(v2.calls(), 2);
    }

    #[tokio::test]
    async fn all_versions_unsupported_is_pending() {
        let v2 = Scripted::new("v2", vec![Err(LookupError::Unsupported(404))]);
        let v1 = Scripted::new("v1", vec![Err(LookupError::Unsupported(501))]);
        let resolver =
            NetworkResolver::new(FakeScheduler::after(0), vec![v2, v1], policy(2, 1));

        let err = resolver.resolve("inst-a").await.unwrap_err();
        assert!(err.to_string().contains("no supported directory endpoint"));
    }

    #[tokio::test]
    async fn all_versions_unsupported_uses_scheduler_ipv6() {
        let v2 = Scripted::new("v2", vec![Err(LookupError::Unsupported(404))]);
        let v1 = Scripted::new("v1", vec![Err(LookupError::Unsupported(404))]);
        let resolver = NetworkResolver::new(
            FakeScheduler::with_vm_ipv6("2001:db8::1/124"),
            vec![v2.clone(), v1.clone()],
            policy(3, 1),
        );

        let address = resolver.resolve("inst-a").await.unwrap();
        assert_eq!(address, NetworkAddress::new("2001:db8::1", 22));
        assert_eq!((v2.calls(), v1.calls()), (1, 1));
    }

    #[tokio::test]
    async fn scheduler_ipv6_does_not_bypass_the_directory() {
        // The node answers but has no address yet: keep polling.
        let v2 = Scripted::new("v2", vec![Ok(None), Ok(Some(addr()))]);
        let resolver = NetworkResolver::new(
            FakeScheduler::with_vm_ipv6("2001:db8::1"),
            vec![v2.clone()],
            policy(3, 1),
        );

        assert_eq!(resolver.resolve("inst-a").await.unwrap(), addr());
        assert_eq!(v2.calls(), 2);
    }

    #[test]
    fn from_config_uses_configured_policy() {
        let config = NetworkConfig::default();
        let resolver = NetworkResolver::from_config(&config);
        assert_eq!(resolver.policy(), PollPolicy::default());
    }
}
