use alloy_primitives::Address;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::ConfirmationPolicy;
use crate::network::{NetworkConfig, NetworkKey};
use crate::session::SessionConfig;
use crate::units::DISPLAY_DECIMALS;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "CHAINTICKET_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub network: Network,
    pub contracts: Contracts,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
    /// Where the disconnected marker is kept.
    pub data_dir: PathBuf,
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: PathBuf::from(".chainticket"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub key: NetworkKey,
    /// Overrides the network's public RPC endpoint.
    pub rpc_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Contracts {
    pub tickets: String,
    pub betting: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// 0 disables balance polling.
    pub balance_poll_secs: u64,
    pub display_decimals: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            balance_poll_secs: 15,
            display_decimals: DISPLAY_DECIMALS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub confirmation_poll_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            confirmation_poll_ms: 1000,
            confirmation_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        Self::parse(&contents)
    }

    /// Load from `$CHAINTICKET_CONFIG`, falling back to `config.toml`.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(&path)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.tickets_address()?;
        config.betting_address()?;
        Ok(config)
    }

    pub fn network(&self) -> &'static NetworkConfig {
        self.network.key.config()
    }

    pub fn rpc_url(&self) -> &str {
        self.network
            .rpc_url
            .as_deref()
            .unwrap_or(self.network().rpc_url)
    }

    pub fn tickets_address(&self) -> anyhow::Result<Address> {
        self.contracts
            .tickets
            .parse()
            .with_context(|| format!("invalid tickets contract address: {}", self.contracts.tickets))
    }

    pub fn betting_address(&self) -> anyhow::Result<Option<Address>> {
        self.contracts
            .betting
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("invalid betting contract address: {}", raw))
            })
            .transpose()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            balance_poll_interval: match self.session.balance_poll_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            display_decimals: self.session.display_decimals,
            required_network: Some(self.network()),
        }
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(self.gateway.confirmation_poll_ms),
            timeout: Duration::from_secs(self.gateway.confirmation_timeout_secs),
        }
    }
}
