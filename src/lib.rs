//! # tollgate
//!
//! A metered-access gateway placed in front of backend APIs.
//!
//! Each request either carries a signed proof against a prepaid contract and
//! is served at the **paid** tier, or it is served at a rate-limited **free**
//! tier. Accepted paid requests record a claim that a settlement process
//! later submits to the ledger.
//!
//! ## Architecture
//!
//! - [`proof`]: wire codecs and validators for delegated and direct proofs
//! - [`ratelimit`]: bounded registry of per-visitor token buckets
//! - [`store`]: contract, claim and policy stores
//! - [`gateway`]: the per-request access decision pipeline and its axum middleware
//! - [`server`]: router, reverse proxy and lifecycle
//!
//! Signatures are ML-DSA-65 via `saorsa-pqc`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tollgate::{GatewayBuilder, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_file(std::path::Path::new("tollgate.toml"))?;
//!     let mut gateway = GatewayBuilder::new(config).build()?;
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod claim;
pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod gateway;
pub mod proof;
pub mod proxy;
pub mod ratelimit;
pub mod server;
pub mod signature;
pub mod store;

pub use claim::{Claim, ClaimIncomeMsg};
pub use config::{ClaimStoreKind, GatewayConfig, Seed};
pub use contract::{Authorization, Contract, ContractConfig, ContractType, Cors, Service};
pub use error::{Error, Result};
pub use event::{GatewayEvent, GatewayEventsChannel};
pub use gateway::{AccessDecision, AccessRequest, Gateway, GatewayStats, Stores, Tier};
pub use proof::{ParseError, Proof, ValidationError};
pub use proxy::Upstream;
pub use ratelimit::RateLimiterRegistry;
pub use server::{router, GatewayBuilder, RunningGateway};
pub use signature::{Address, MlDsaVerifier, PubKey, SignatureVerifier};
pub use store::{ClaimStore, ConfigStore, ContractStore, StoreError};
