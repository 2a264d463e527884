//! skylift.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyliftConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub credentials: CredentialsConfig,
    pub provider: ProviderConfig,
    pub network: NetworkConfig,
    pub ssh: SshConfig,
    pub tunnel: TunnelConfig,
    pub stack: StackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8002".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates/apps.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Private half of the automation keypair; the public half is `<file>.pub`.
    pub identity_file: String,
    /// Login user on provisioned instances.
    pub user: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            identity_file: "~/.ssh/skylift_automation".to_string(),
            user: "root".to_string(),
        }
    }
}

impl CredentialsConfig {
    /// `identity_file` with a leading `~/` expanded from `$HOME`.
    pub fn identity_path(&self) -> PathBuf {
        expand_home(&self.identity_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider gateway base URL. Without it only manual provisioning
    /// instructions are available.
    pub api_url: Option<String>,
    pub rootfs: String,
    pub channel: String,
    pub request_timeout: String,
    pub limits: ProviderLimitsConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            rootfs: "debian12".to_string(),
            channel: "SKYLIFT".to_string(),
            request_timeout: "60s".to_string(),
            limits: ProviderLimitsConfig::default(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderLimitsConfig {
    pub max_vcpus: u32,
    pub min_memory_mb: u64,
    pub max_memory_mb: u64,
    pub min_disk_gb: u64,
    pub max_disk_gb: u64,
}

impl Default for ProviderLimitsConfig {
    fn default() -> Self {
        Self {
            max_vcpus: 12,
            min_memory_mb: 512,
            max_memory_mb: 65_536,
            min_disk_gb: 20,
            max_disk_gb: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub scheduler_url: String,
    pub attempts: u32,
    pub interval: String,
    pub request_timeout: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scheduler_url: "https://scheduler.api.aleph.cloud".to_string(),
            attempts: 30,
            interval: "10s".to_string(),
            request_timeout: "15s".to_string(),
        }
    }
}

impl NetworkConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(15))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// OpenSSH client binary.
    pub program: String,
    pub connect_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
    pub connect_timeout: String,
    pub command_timeout: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_attempts: 5,
            initial_backoff: "2s".to_string(),
            max_backoff: "30s".to_string(),
            connect_timeout: "10s".to_string(),
            command_timeout: "300s".to_string(),
        }
    }
}

impl SshConfig {
    pub fn initial_backoff(&self) -> Duration {
        parse_duration(&self.initial_backoff).unwrap_or(Duration::from_secs(2))
    }

    pub fn max_backoff(&self) -> Duration {
        parse_duration(&self.max_backoff).unwrap_or(Duration::from_secs(30))
    }

    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn command_timeout(&self) -> Duration {
        parse_duration(&self.command_timeout).unwrap_or(Duration::from_secs(300))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    pub agent_path: String,
    pub download_url: String,
    pub poll_attempts: u32,
    pub poll_interval: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            agent_path: "/usr/local/bin/cloudflared".to_string(),
            download_url: "https://github.com/cloudflare/cloudflared/releases/latest/download/cloudflared-linux-amd64".to_string(),
            poll_attempts: 15,
            poll_interval: "2s".to_string(),
        }
    }
}

impl TunnelConfig {
    pub fn poll_interval(&self) -> Duration {
        parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(2))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub apps_root: String,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            apps_root: "/root/apps".to_string(),
        }
    }
}

impl SkyliftConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SkyliftConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject duration strings the accessors would silently replace.
    fn validate(&self) -> anyhow::Result<()> {
        let durations = [
            ("provider.request_timeout", &self.provider.request_timeout),
            ("network.interval", &self.network.interval),
            ("network.request_timeout", &self.network.request_timeout),
            ("ssh.initial_backoff", &self.ssh.initial_backoff),
            ("ssh.max_backoff", &self.ssh.max_backoff),
            ("ssh.connect_timeout", &self.ssh.connect_timeout),
            ("ssh.command_timeout", &self.ssh.command_timeout),
            ("tunnel.poll_interval", &self.tunnel.poll_interval),
        ];
        for (key, value) in durations {
            if parse_duration(value).is_none() {
                anyhow::bail!("invalid duration for {key}: {value:?}");
            }
        }
        if self.network.attempts == 0 {
            anyhow::bail!("network.attempts must be at least 1");
        }
        if self.ssh.connect_attempts == 0 {
            anyhow::bail!("ssh.connect_attempts must be at least 1");
        }
        if self.tunnel.poll_attempts == 0 {
            anyhow::bail!("tunnel.poll_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let config = SkyliftConfig::default();
        assert_eq!(config.network.attempts, 30);
        assert_eq!(config.network.interval(), Duration::from_secs(10));
        assert!(config.provider.api_url.is_none());
        assert_eq!(config.credentials.user, "root");
    }

    #[test]
    fn parse_partial_file() {
        let toml_str = r#"
[network]
attempts = 5
interval = "500ms"

[provider]
api_url = "http://localhost:9000/api/v0"
"#;
        let config = SkyliftConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.network.attempts, 5);
        assert_eq!(config.network.interval(), Duration::from_millis(500));
        assert_eq!(
            config.provider.api_url.as_deref(),
            Some("http://localhost:9000/api/v0")
        );
        assert_eq!(config.ssh.connect_attempts, 5);
        assert_eq!(config.stack.apps_root, "/root/apps");
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let toml_str = r#"
[ssh]
command_timeout = "forever"
"#;
        let err = SkyliftConfig::from_toml_str(toml_str).unwrap_err();
        assert!(err.to_string().contains("ssh.command_timeout"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = SkyliftConfig::from_toml_str("[network]\nattempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("network.attempts"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = SkyliftConfig::default().to_toml_string().unwrap();
        let parsed = SkyliftConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.tunnel.poll_attempts, 15);
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn identity_path_without_tilde_is_unchanged() {
        let creds = CredentialsConfig {
            identity_file: "/etc/skylift/key".to_string(),
            user: "root".to_string(),
        };
        assert_eq!(creds.identity_path(), PathBuf::from("/etc/skylift/key"));
    }

    #[test]
    fn shipped_config_parses() {
        let config = SkyliftConfig::from_toml_str(include_str!("../../../skylift.toml")).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:8002");
        assert_eq!(config.ssh.command_timeout(), Duration::from_secs(300));
        assert_eq!(config.provider.limits.max_vcpus, 12);
    }
}
