//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tollgate::config::{ClaimStoreKind, GatewayConfig};

/// Metered-access gateway for paid contract traffic.
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for gateway data.
    #[arg(long, env = "TOLLGATE_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, short, env = "TOLLGATE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Provider public key (hex).
    #[arg(long, env = "TOLLGATE_PROVIDER_PUBKEY")]
    pub provider_pubkey: Option<String>,

    /// Free-tier requests per minute per caller address.
    #[arg(long, env = "TOLLGATE_FREE_TIER_RATE_LIMIT")]
    pub free_tier_rate_limit: Option<u32>,

    /// Maximum number of tracked rate-limit keys.
    #[arg(long, env = "TOLLGATE_RATE_LIMITER_CAPACITY")]
    pub rate_limiter_capacity: Option<usize>,

    /// Base URL of the metered backend.
    #[arg(long, short, env = "TOLLGATE_UPSTREAM")]
    pub upstream: Option<String>,

    /// Claim store backend.
    #[arg(long, value_enum, env = "TOLLGATE_CLAIM_STORE")]
    pub claim_store: Option<CliClaimStore>,

    /// TOML file with contracts and policies to load at startup.
    #[arg(long, env = "TOLLGATE_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Log level (overrides the config file; `RUST_LOG` overrides both).
    #[arg(long, env = "TOLLGATE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "TOLLGATE_JSON_LOGS")]
    pub json_logs: bool,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Claim store CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliClaimStore {
    /// In process memory.
    Memory,
    /// Files under the root directory.
    Disk,
}

impl Cli {
    /// Convert CLI arguments into a `GatewayConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<GatewayConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            GatewayConfig::from_file(path)?
        } else {
            GatewayConfig::default()
        };

        // Override with CLI arguments
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(provider_pubkey) = self.provider_pubkey {
            config.provider_pubkey = provider_pubkey;
        }
        if let Some(limit) = self.free_tier_rate_limit {
            config.free_tier_rate_limit = limit;
        }
        if let Some(capacity) = self.rate_limiter_capacity {
            config.rate_limiter_capacity = capacity;
        }
        if let Some(upstream) = self.upstream {
            config.upstream = upstream;
        }
        if let Some(store) = self.claim_store {
            config.claim_store = store.into();
        }
        if self.seed_file.is_some() {
            config.seed_file = self.seed_file;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        Ok(config)
    }
}

impl From<CliClaimStore> for ClaimStoreKind {
    fn from(store: CliClaimStore) -> Self {
        match store {
            CliClaimStore::Memory => ClaimStoreKind::Memory,
            CliClaimStore::Disk => ClaimStoreKind::Disk,
        }
    }
}
