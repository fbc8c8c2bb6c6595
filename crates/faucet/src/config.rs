//! Faucet configuration

use drip_common::utils::config::{load_config, parse_amount};
use drip_common::utils::logging::LoggingConfig;
use drip_common::{CreditPolicy, FaucetError, FaucetResult, GlobalSettings, Network, User};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Faucet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Ledger database path
    pub db_path: String,

    pub logging: LoggingConfig,

    pub settings: GlobalSettings,

    /// Networks the faucet disburses on
    pub networks: Vec<NetworkConfig>,

    pub identity: IdentityConfig,

    /// On-chain registry, required by `registry_override` networks
    pub registry: Option<RegistryConfig>,

    /// Timeout for identity and registry lookups (milliseconds)
    pub lookup_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub id: String,

    /// Display name, defaults to the id
    #[serde(default)]
    pub name: Option<String>,

    pub chain_id: u64,

    /// Claim cap in minor units (decimal string)
    pub max_claim_amount: String,

    #[serde(default)]
    pub policy: CreditPolicy,

    /// Cap for registry-verified users (decimal string)
    #[serde(default)]
    pub elevated_claim_amount: Option<String>,
}

impl NetworkConfig {
    pub fn to_network(&self) -> FaucetResult<Network> {
        let max_claim_amount = parse_amount(
            &format!("networks.{}.max_claim_amount", self.id),
            &self.max_claim_amount,
        )?;

        let mut network = Network::new(self.id.clone(), self.chain_id, max_claim_amount)
            .with_policy(self.policy);
        if let Some(name) = &self.name {
            network.name = name.clone();
        }
        if let Some(amount) = &self.elevated_claim_amount {
            network = network.with_elevated_claim_amount(parse_amount(
                &format!("networks.{}.elevated_claim_amount", self.id),
                amount,
            )?);
        }
        Ok(network)
    }
}

/// Identity verification source. Without an endpoint the static `users`
/// directory is authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub endpoint: Option<String>,
    pub app: String,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub rpc_url: String,
    pub contract_address: String,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            db_path: "./drip_data".to_string(),
            logging: LoggingConfig::default(),
            settings: GlobalSettings::default(),
            networks: Vec::new(),
            identity: IdentityConfig::default(),
            registry: None,
            lookup_timeout_ms: 5_000,
        }
    }
}

impl FaucetConfig {
    /// Load from a config file; `DRIP_`-prefixed variables override it
    pub fn load<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        load_config(path)
    }

    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(db_path) = std::env::var("DRIP_DB_PATH") {
            config.db_path = db_path;
        }

        if let Ok(limit) = std::env::var("DRIP_WEEKLY_CHAIN_CLAIM_LIMIT") {
            config.settings.weekly_chain_claim_limit = limit
                .parse()
                .unwrap_or(config.settings.weekly_chain_claim_limit);
        }

        if let Ok(level) = std::env::var("DRIP_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(timeout) = std::env::var("DRIP_LOOKUP_TIMEOUT_MS") {
            config.lookup_timeout_ms = timeout.parse().unwrap_or(config.lookup_timeout_ms);
        }

        config
    }

    /// Parsed network table. Ids must be unique.
    pub fn networks(&self) -> FaucetResult<Vec<Network>> {
        let mut seen = HashSet::new();
        self.networks
            .iter()
            .map(|entry| {
                if !seen.insert(entry.id.as_str()) {
                    return Err(FaucetError::Configuration(format!(
                        "network {} is configured twice",
                        entry.id
                    )));
                }
                entry.to_network()
            })
            .collect()
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}
