//! Configuration for tollgate.

use crate::contract::{Contract, ContractConfig};
use crate::error::{Error, Result};
use crate::store::{ContractStore, MemoryConfigStore, MemoryContractStore};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Where claims are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStoreKind {
    /// In process memory; lost on restart.
    #[default]
    Memory,
    /// One file per contract under `{root_dir}/claims`.
    Disk,
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Root directory for gateway data.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Address the HTTP listener binds.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Provider public key (hex). Contracts are served on its behalf.
    #[serde(default)]
    pub provider_pubkey: String,

    /// Free-tier requests per minute per caller address.
    #[serde(default = "default_free_tier_rate_limit")]
    pub free_tier_rate_limit: u32,

    /// Maximum number of tracked rate-limit keys.
    #[serde(default = "default_rate_limiter_capacity")]
    pub rate_limiter_capacity: usize,

    /// Base URL of the metered backend.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Claim store backend.
    #[serde(default)]
    pub claim_store: ClaimStoreKind,

    /// Contracts and policies to load at startup.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            listen: default_listen(),
            provider_pubkey: String::new(),
            free_tier_rate_limit: default_free_tier_rate_limit(),
            rate_limiter_capacity: default_rate_limiter_capacity(),
            upstream: default_upstream(),
            claim_store: ClaimStoreKind::default(),
            seed_file: None,
            log_level: default_log_level(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tollgate")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".tollgate"))
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3636))
}

const fn default_free_tier_rate_limit() -> u32 {
    10
}

const fn default_rate_limiter_capacity() -> usize {
    crate::ratelimit::DEFAULT_REGISTRY_CAPACITY
}

fn default_upstream() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Initial contract cache contents.
///
/// ```toml
/// height = 120
///
/// [[contracts]]
/// id = 7
/// service = "mock"
/// type = "pay_as_you_go"
/// # ...
///
/// [[configs]]
/// contract_id = 7
/// whitelist_ip_addresses = ["10.0.0.1"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    /// Ledger height to start from.
    #[serde(default)]
    pub height: i64,

    /// Contracts to cache.
    #[serde(default)]
    pub contracts: Vec<Contract>,

    /// Per-contract policies.
    #[serde(default)]
    pub configs: Vec<ContractConfig>,
}

impl Seed {
    /// Load a seed from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a contract
    /// uses the reserved id zero.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let seed: Self = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        if seed.contracts.iter().any(|c| c.id == 0) {
            return Err(Error::Config("contract id 0 is reserved".to_string()));
        }
        Ok(seed)
    }

    /// Load the seed into the stores.
    ///
    /// # Errors
    ///
    /// Returns an error if a contract cannot be stored.
    pub fn apply(self, contracts: &MemoryContractStore, configs: &MemoryConfigStore) -> Result<()> {
        contracts.set_height(self.height);
        for contract in self.contracts {
            contracts.put(contract)?;
        }
        for config in self.configs {
            configs.put(config);
        }
        Ok(())
    }
}
