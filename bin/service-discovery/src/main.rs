use anyhow::{Context, Result};
use rpc_api::address::combine_address;
use rpc_api::Target;
use rpc_core::{matchmaker, PublisherEndpoint, RouterConfig};
use rpc_proxy::TargetUpdater;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::init as tracing_init;

/// Environment variable naming the YAML configuration file
const CONFIG_ENV: &str = "RPC_ROUTER_CONFIG";
/// Environment variable overriding the advertised host
const HOST_ENV: &str = "RPC_ROUTER_HOST";

/// Daemon configuration: router settings plus what this node advertises
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiscoveryConfig {
    router: RouterConfig,
    /// Host registered for every target, `localhost:<rpc_port>` if unset
    host: Option<String>,
    /// Targets served by this node
    targets: Vec<Target>,
    /// Publisher endpoint of this node, if it runs a proxy
    publisher: Option<PublisherEndpoint>,
}

impl DiscoveryConfig {
    fn from_yaml_str(data: &str) -> Result<Self> {
        let config: DiscoveryConfig = serde_yaml::from_str(data)?;
        config.router.validate()?;
        for target in &config.targets {
            target
                .validate()
                .with_context(|| format!("invalid target {:?}", target))?;
        }
        Ok(config)
    }

    fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| combine_address("localhost", self.router.rpc_port))
    }

    fn registrations(&self) -> Vec<(Target, String)> {
        let host = self.host();
        self.targets
            .iter()
            .map(|target| (target.clone(), host.clone()))
            .collect()
    }
}

/// Load configuration from the file named by the environment, or defaults
fn load_config() -> Result<DiscoveryConfig> {
    let mut config = match std::env::var(CONFIG_ENV).ok() {
        Some(path) => {
            let data = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path))?;
            let config = DiscoveryConfig::from_yaml_str(&data)
                .with_context(|| format!("failed to parse {}", path))?;
            info!("Configuration loaded from {}", path);
            config
        }
        None => {
            warn!("{} not set, using default configuration", CONFIG_ENV);
            DiscoveryConfig::default()
        }
    };

    if let Ok(host) = std::env::var(HOST_ENV) {
        config.host = Some(host);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting service-discovery daemon...");

    let config = load_config()?;
    let matchmaker = matchmaker::from_config(&config.router)?;

    let registrations = config.registrations();
    info!(
        host = %config.host(),
        targets = registrations.len(),
        publisher = config.publisher.is_some(),
        "Advertising node"
    );
    if registrations.is_empty() && config.publisher.is_none() {
        warn!("Nothing to register, daemon will idle");
    }

    let updater = TargetUpdater::start(
        matchmaker.clone(),
        registrations,
        config.publisher.clone(),
        config.router.target_update_interval,
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down service-discovery daemon...");

    if let Err(e) = updater.shutdown().await {
        error!("Failed to withdraw registrations: {}", e);
    }

    match matchmaker.get_publishers().await {
        Ok(publishers) => info!("{} publishers remain registered", publishers.len()),
        Err(e) => warn!("Could not read publishers after shutdown: {}", e),
    }

    Ok(())
}
