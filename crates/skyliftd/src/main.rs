//! skyliftd — the Skylift daemon.
//!
//! Single binary that assembles the deployment engine:
//! - Deployment record store (redb, in-memory)
//! - Template catalog and automation credential source
//! - Instance provisioner (gateway or manual instructions)
//! - Network resolver, SSH executor and the stage runners built on it
//! - REST API
//!
//! # Usage
//!
//! ```text
//! skyliftd serve --config /etc/skylift/skylift.toml --listen 0.0.0.0:8002
//! skyliftd defaults > skylift.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use skylift_core::{CredentialSource, FileCredentialSource, SkyliftConfig, StaticCatalog};
use skylift_network::NetworkResolver;
use skylift_orchestrator::{DeploymentService, Orchestrator};
use skylift_provision::{GatewayProvisioner, ManualProvisioner, ProviderLimits, Provisioner};
use skylift_remote::SshExecutor;
use skylift_state::{DeploymentRepository, StateStore};

const DEFAULT_CONFIG: &str = "skylift.toml";

#[derive(Parser)]
#[command(name = "skyliftd", about = "Skylift deployment daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the deployment engine and its REST API.
    Serve {
        /// Config file. Defaults apply when omitted and ./skylift.toml is absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overriding `server.listen`.
        #[arg(long)]
        listen: Option<String>,
    },
    /// Print the default configuration as TOML.
    Defaults,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,skyliftd=debug,skylift=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve { config, listen } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            serve(config).await
        }
        Command::Defaults => {
            print!("{}", SkyliftConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

/// An explicitly passed file must exist; the implicit one is optional.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<SkyliftConfig> {
    match explicit {
        Some(path) => SkyliftConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            SkyliftConfig::from_file(Path::new(DEFAULT_CONFIG))
        }
        None => {
            info!("no {DEFAULT_CONFIG} found, using defaults");
            Ok(SkyliftConfig::default())
        }
    }
}

fn select_provisioner(config: &SkyliftConfig) -> anyhow::Result<Arc<dyn Provisioner>> {
    match &config.provider.api_url {
        Some(url) => {
            let gateway = GatewayProvisioner::new(url.as_str(), &config.provider)
                .context("invalid provider configuration")?;
            info!(%url, rootfs = %config.provider.rootfs, "gateway provisioning enabled");
            Ok(Arc::new(gateway))
        }
        None => {
            warn!("provider.api_url not set; deployments will stop at manual provisioning instructions");
            Ok(Arc::new(ManualProvisioner::new(ProviderLimits::from(
                &config.provider.limits,
            ))))
        }
    }
}

async fn serve(config: SkyliftConfig) -> anyhow::Result<()> {
    info!("Skylift daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let repo: Arc<dyn DeploymentRepository> = Arc::new(StateStore::open_in_memory()?);
    info!("deployment store opened (in-memory; records do not survive restarts)");

    let catalog = StaticCatalog::from_file(&config.catalog.path)
        .with_context(|| format!("loading catalog {}", config.catalog.path.display()))?;
    info!(
        path = %config.catalog.path.display(),
        apps = skylift_core::TemplateCatalog::list(&catalog).len(),
        "template catalog loaded"
    );

    let credentials = FileCredentialSource::new(
        config.credentials.identity_path(),
        config.credentials.user.clone(),
    );
    match credentials.automation_credential() {
        Ok(credential) => {
            info!(fingerprint = %credential.fingerprint(), "automation credential loaded")
        }
        // Rotation may put the key in place later; requests fail until then.
        Err(e) => warn!(error = %e, "automation credential unavailable"),
    }

    let provisioner = select_provisioner(&config)?;
    let resolver = Arc::new(NetworkResolver::from_config(&config.network));
    info!(
        scheduler = %config.network.scheduler_url,
        attempts = config.network.attempts,
        "network resolver initialized"
    );
    let executor = Arc::new(SshExecutor::from_config(&config.ssh));

    let orchestrator = Orchestrator::new(repo.clone(), provisioner, resolver, executor, &config);
    let service = DeploymentService::new(
        repo.clone(),
        Arc::new(catalog),
        Arc::new(credentials),
        Arc::new(orchestrator),
    );

    // ── Start API server ───────────────────────────────────────

    let router = skylift_api::build_router(service);
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(addr = %config.server.listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    let in_flight = repo
        .list()
        .map(|records| records.iter().filter(|r| !r.is_terminal()).count())
        .unwrap_or(0);
    if in_flight > 0 {
        warn!(in_flight, "abandoning in-flight deployments; their instances are left as they are");
    }

    info!("Skylift daemon stopped");
    Ok(())
}
