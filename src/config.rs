use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    pub security: SecurityConfig,
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Whether `invoke` may send state-changing transactions.
    pub allow_write_operations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub receipt_poll_interval_ms: u64,
}

impl DispatcherConfig {
    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        // Ganache GUI, the fallback the browser page uses without a wallet.
        networks.insert(
            "ganache".to_string(),
            NetworkConfig {
                rpc_url: "http://localhost:7545".to_string(),
                chain_id: 1337,
                explorer_url: None,
            },
        );

        networks.insert(
            "localhost".to_string(),
            NetworkConfig {
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 31337,
                explorer_url: None,
            },
        );

        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-sepolia.g.alchemy.com/v2/demo".to_string(),
                chain_id: 11155111,
                explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            },
        );

        networks.insert(
            "ethereum".to_string(),
            NetworkConfig {
                rpc_url: "https://eth-mainnet.g.alchemy.com/v2/demo".to_string(),
                chain_id: 1,
                explorer_url: Some("https://etherscan.io".to_string()),
            },
        );

        Self {
            networks,
            default_network: "ganache".to_string(),
            security: SecurityConfig {
                allow_write_operations: false,
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5432,
            },
            dispatcher: DispatcherConfig {
                receipt_poll_interval_ms: 1000,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars(
            std::env::var("ETH_INTERFACE_RPC_URL").ok(),
            std::env::var("ALCHEMY_API_KEY").ok(),
        );
        config
    }

    pub fn network(&self, name: Option<&str>) -> Result<&NetworkConfig> {
        let name = name.unwrap_or(&self.default_network);
        self.networks
            .get(name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", name))
    }

    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.keys().cloned().collect();
        names.sort();
        names
    }

    /// `rpc_url` replaces the default network's endpoint; `alchemy_key`
    /// fills in Alchemy placeholder URLs.
    fn apply_env_vars(&mut self, rpc_url: Option<String>, alchemy_key: Option<String>) {
        if let Some(rpc_url) = rpc_url {
            if let Some(network) = self.networks.get_mut(&self.default_network) {
                tracing::info!("Using ETH_INTERFACE_RPC_URL for network {}", self.default_network);
                network.rpc_url = rpc_url;
            }
        }

        let Some(api_key) = alchemy_key else {
            return;
        };

        for (network_name, network_config) in &mut self.networks {
            if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                network_config.rpc_url = network_config
                    .rpc_url
                    .replace("/demo", &format!("/{}", api_key));
                tracing::debug!("Updated {} RPC URL with API key", network_name);
            } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                network_config.rpc_url = network_config
                    .rpc_url
                    .replace("YOUR_API_KEY_HERE", &api_key);
                tracing::debug!("Updated {} RPC URL with API key", network_name);
            }
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("eth-interface-generator").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# eth-interface-generator configuration

# Network used by `info` and `invoke` when --network is not given
default_network = "ganache"

[networks.ganache]
rpc_url = "http://localhost:7545"
chain_id = 1337

[networks.localhost]
rpc_url = "http://localhost:8545"
chain_id = 31337

[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[security]
# `invoke` refuses to send transactions unless this is set or --allow-writes is passed
allow_write_operations = false

[server]
host = "127.0.0.1"
port = 5432

[dispatcher]
receipt_poll_interval_ms = 1000

# Environment variables:
# ETH_INTERFACE_RPC_URL - RPC endpoint for the default network
# ALCHEMY_API_KEY       - replaces YOUR_API_KEY_HERE above
# ETH_PRIVATE_KEY       - key used by `invoke` to sign transactions locally
"#;
        sample_config.to_string()
    }
}
