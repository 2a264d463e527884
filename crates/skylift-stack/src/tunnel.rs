//! Quick-tunnel publishing.
//!
//! The agent is started detached on the instance with its log redirected
//! to a per-port file; the publisher then reads that file until the
//! assigned hostname shows up.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use skylift_core::config::TunnelConfig;
use skylift_remote::shell::{quote, tail};
use skylift_remote::{RemoteExecutor, RemoteTarget};

use crate::error::{TunnelError, TunnelResult};

const URL_PATTERN: &str = r"https://[a-z0-9-]+\.trycloudflare\.com";

/// Extract the public URL from agent output.
pub fn parse_public_url(log: &str) -> Option<String> {
    let re = Regex::new(URL_PATTERN).ok()?;
    re.find(log).map(|m| m.as_str().to_string())
}

/// First line where the agent reports a failure.
fn agent_failure(log: &str) -> Option<&str> {
    log.lines()
        .find(|line| line.contains(" ERR ") || line.to_ascii_lowercase().contains("failed to"))
        .map(str::trim)
}

pub struct TunnelPublisher {
    executor: Arc<dyn RemoteExecutor>,
    agent_path: String,
    download_url: String,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl TunnelPublisher {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &TunnelConfig) -> Self {
        Self {
            executor,
            agent_path: config.agent_path.clone(),
            download_url: config.download_url.clone(),
            poll_attempts: config.poll_attempts,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn log_path(port: u16) -> String {
        format!("/tmp/skylift-tunnel-{port}.log")
    }

    /// Expose `localhost:{port}` on the instance and return its public URL.
    pub async fn publish(&self, target: &RemoteTarget, port: u16) -> TunnelResult<String> {
        self.ensure_agent(target).await?;
        self.start(target, port).await?;

        let log_path = Self::log_path(port);
        let read_log = format!("cat {}", quote(&log_path));
        let attempts = self.poll_attempts.max(1);
        let mut last_log = String::new();

        for attempt in 1..=attempts {
            let out = self.executor.run(target, &read_log).await?;
            // A missing log just means the agent has not written yet.
            if out.success() {
                if let Some(url) = parse_public_url(&out.stdout) {
                    info!(%target, port, %url, "tunnel published");
                    return Ok(url);
                }
                if let Some(line) = agent_failure(&out.stdout) {
                    warn!(%target, port, line, "tunnel agent failed");
                    return Err(TunnelError::AgentFailed {
                        line: line.to_string(),
                    });
                }
                last_log = out.stdout;
            }
            debug!(%target, port, attempt, attempts, "tunnel URL not yet available");
            if attempt < attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(TunnelError::UrlNotFound {
            attempts,
            log_tail: tail(&last_log),
        })
    }

    async fn ensure_agent(&self, target: &RemoteTarget) -> TunnelResult<()> {
        let agent = quote(&self.agent_path);
        if self
            .executor
            .run(target, &format!("test -x {agent}"))
            .await?
            .success()
        {
            return Ok(());
        }
        info!(%target, "installing tunnel agent");
        let install = self
            .executor
            .run(
                target,
                &format!(
                    "curl -fsSL -o {agent} {} && chmod +x {agent}",
                    quote(&self.download_url)
                ),
            )
            .await?;
        if !install.success() {
            return Err(TunnelError::Install {
                exit_code: install.exit_code,
                output: install.diagnostic(),
            });
        }
        Ok(())
    }

    /// Start the agent unless one is already serving `port`.
    async fn start(&self, target: &RemoteTarget, port: u16) -> TunnelResult<()> {
        let origin = format!("http://localhost:{port}");
        // The bracket keeps pgrep from matching this very shell.
        let running = format!("[t]unnel --no-autoupdate --url {origin}$");
        let command = format!(
            "pgrep -f {} >/dev/null || (nohup setsid {} tunnel --no-autoupdate --url {} > {} 2>&1 < /dev/null &)",
            quote(&running),
            quote(&self.agent_path),
            quote(&origin),
            quote(&Self::log_path(port)),
        );
        let out = self.executor.run(target, &command).await?;
        if !out.success() {
            return Err(TunnelError::Start {
                exit_code: out.exit_code,
                output: out.diagnostic(),
            });
        }
        debug!(%target, port, "tunnel agent running");
        Ok(())
    }
}
