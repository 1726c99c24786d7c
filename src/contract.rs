//! Contracts and their per-contract gateway configuration.
//!
//! A contract is originated on the ledger and cached locally. The gateway only
//! mutates two fields: `nonce` (advanced on accepted delegated proofs) and the
//! gateway-local `last_timestamp` (advanced on accepted direct proofs).

use crate::signature::PubKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a service name.
const MAX_SERVICE_NAME_LEN: usize = 64;

/// Billing model of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    /// Flat subscription for the contract duration.
    Subscription,
    /// Metered against a prepaid deposit, `rate` per unit.
    PayAsYouGo,
}

/// Whether requests need a per-request proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    /// Proof required.
    #[default]
    Restricted,
    /// Any request is served without proof validation.
    Open,
}

/// Error returned for an unparseable service name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid service name: {0:?}")]
pub struct InvalidService(pub String);

/// Name of the backend service a contract pays for, e.g. `btc-mainnet-fullnode`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Service(String);

impl Service {
    /// The service name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Service {
    type Err = InvalidService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.len() <= MAX_SERVICE_NAME_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidService(s.to_string()))
        }
    }
}

impl TryFrom<String> for Service {
    type Error = InvalidService;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Service> for String {
    fn from(service: Service) -> Self {
        service.0
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached contract state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Ledger contract id (never zero).
    pub id: u64,
    /// Provider serving the contract.
    pub provider: PubKey,
    /// Service the contract pays for.
    pub service: Service,
    /// Paying client.
    pub client: PubKey,
    /// Key allowed to spend on behalf of the client.
    #[serde(default)]
    pub delegate: Option<PubKey>,
    /// Billing model.
    #[serde(rename = "type")]
    pub contract_type: ContractType,
    /// Proof requirement.
    #[serde(default)]
    pub authorization: Authorization,
    /// Height the contract was opened at.
    pub height: i64,
    /// Number of blocks the contract runs for.
    pub duration: i64,
    /// Blocks after expiration during which claims can still settle.
    #[serde(default)]
    pub settlement_duration: i64,
    /// Price per unit of consumption.
    #[serde(default)]
    pub rate: u64,
    /// Prepaid balance; `None` when the ledger reported no deposit.
    #[serde(default)]
    pub deposit: Option<u64>,
    /// Last authorized sequence number.
    #[serde(default)]
    pub nonce: i64,
    /// Contract-level throttle.
    #[serde(default)]
    pub queries_per_minute: u32,
    /// Highest accepted direct-client proof timestamp (gateway-local).
    #[serde(default)]
    pub last_timestamp: i64,
}

impl Contract {
    /// Key allowed to sign delegated proofs: the delegate if set, else the client.
    #[must_use]
    pub fn spender(&self) -> &PubKey {
        self.delegate.as_ref().unwrap_or(&self.client)
    }

    /// Last height at which the contract may be consumed.
    #[must_use]
    pub fn expiration(&self) -> i64 {
        self.height.saturating_add(self.duration)
    }

    /// Whether the observed ledger `height` is past the contract's expiration.
    #[must_use]
    pub fn is_expired(&self, height: i64) -> bool {
        height > self.expiration()
    }

    /// Whether requests are served without proof validation.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.authorization == Authorization::Open
    }

    /// Whether the deposit covers consumption up to `nonce` units.
    ///
    /// Subscriptions always afford; pay-as-you-go needs `deposit >= nonce * rate`.
    #[must_use]
    pub fn affords(&self, nonce: i64) -> bool {
        match self.contract_type {
            ContractType::Subscription => true,
            ContractType::PayAsYouGo => self
                .deposit
                .is_some_and(|deposit| i128::from(deposit) >= i128::from(nonce) * i128::from(self.rate)),
        }
    }
}

/// CORS values to advertise for a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cors {
    /// `Access-Control-Allow-Origin` entries.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// `Access-Control-Allow-Methods` entries.
    #[serde(default)]
    pub allow_methods: Vec<String>,
    /// `Access-Control-Allow-Headers` entries.
    #[serde(default)]
    pub allow_headers: Vec<String>,
}

/// Per-contract gateway policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Contract the policy applies to.
    pub contract_id: u64,
    /// CORS headers.
    #[serde(default)]
    pub cors: Cors,
    /// Caller addresses allowed to use the contract; empty allows everyone.
    #[serde(default)]
    pub whitelist_ip_addresses: Vec<String>,
    /// Requests per minute per caller address; zero disables the limit.
    #[serde(default)]
    pub per_user_rate_limit: u32,
}

impl ContractConfig {
    /// Whether `remote_addr` passes the allowlist (case-insensitive).
    #[must_use]
    pub fn allows(&self, remote_addr: &str) -> bool {
        self.whitelist_ip_addresses.is_empty()
            || self
                .whitelist_ip_addresses
                .iter()
                .any(|ip| ip.eq_ignore_ascii_case(remote_addr))
    }
}
