//! Outcomes of the access decision pipeline.

use crate::contract::{Contract, ContractConfig, Cors};
use crate::proof::{ParseError, Proof, ValidationError};
use crate::store::StoreError;
use axum::http::StatusCode;
use std::fmt;

/// Service tier a request is served at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Metered against a contract.
    Paid,
    /// Anonymous, globally rate limited.
    Free,
}

impl Tier {
    /// Value of the `tier` response header.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal rejection; the request is answered without reaching the backend.
#[derive(Debug)]
pub enum Denial {
    /// A proof parameter was present but malformed.
    MalformedProof(ParseError),
    /// Caller address not on the contract's allowlist.
    Forbidden,
    /// Per-user limit on the contract exhausted.
    ContractRateLimited,
    /// Path does not name the contract's service.
    ServiceMismatch {
        /// Service bound to the contract.
        expected: String,
        /// First path segment.
        found: String,
    },
    /// Claim or contract could not be committed.
    CommitFailed(StoreError),
    /// Free-tier limit exhausted.
    FreeTierRateLimited,
}

impl Denial {
    /// HTTP status returned to the caller.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedProof(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ContractRateLimited | Self::FreeTierRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceMismatch { .. } => StatusCode::UNAUTHORIZED,
            Self::CommitFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response body.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::MalformedProof(e) => e.to_string(),
            Self::ServiceMismatch { .. } => {
                "contract service doesn't match the service name in the path".to_string()
            }
            _ => self
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Why a request eligible for the paid tier was not served there.
///
/// These never terminate the request; it is re-evaluated at the free tier.
#[derive(Debug)]
pub enum PaidRejection {
    /// Restricted contract and no signed proof.
    MissingProof,
    /// Proof did not validate.
    InvalidProof(ValidationError),
    /// Contract is past its expiration height.
    Expired {
        /// Observed ledger height.
        height: i64,
        /// Contract expiration height.
        expiration: i64,
    },
    /// Nonce not greater than the recorded one.
    Replay {
        /// Nonce in the proof.
        presented: i64,
        /// Highest nonce on record.
        recorded: i64,
    },
    /// Direct proof timestamp not greater than the recorded one.
    StaleTimestamp {
        /// Timestamp in the proof.
        presented: i64,
        /// Highest timestamp on record.
        recorded: i64,
    },
    /// Deposit does not cover the requested consumption.
    DepositExhausted,
    /// Contract `queries_per_minute` exhausted.
    RateLimited,
}

impl PaidRejection {
    /// Status the paid tier would have answered with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingProof | Self::InvalidProof(_) => StatusCode::UNAUTHORIZED,
            Self::Expired { .. } | Self::DepositExhausted => StatusCode::PAYMENT_REQUIRED,
            Self::Replay { .. } | Self::StaleTimestamp { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl fmt::Display for PaidRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingProof => f.write_str("no signed proof for restricted contract"),
            Self::InvalidProof(e) => write!(f, "invalid proof: {e}"),
            Self::Expired { height, expiration } => {
                write!(f, "contract expired at {expiration} (height {height})")
            }
            Self::Replay {
                presented,
                recorded,
            } => write!(f, "bad nonce ({presented}/{recorded})"),
            Self::StaleTimestamp {
                presented,
                recorded,
            } => write!(f, "stale timestamp ({presented}/{recorded})"),
            Self::DepositExhausted => f.write_str("contract spent"),
            Self::RateLimited => f.write_str("client is rate limited"),
        }
    }
}

/// Result of looking up the contract a request names.
#[derive(Debug)]
pub enum Resolution {
    /// Contract and its policy found.
    Resolved {
        /// Proof naming the contract.
        proof: Proof,
        /// Cached contract.
        contract: Box<Contract>,
        /// Contract policy (default when none configured).
        config: ContractConfig,
    },
    /// Evaluate the request at the free tier only.
    Degraded(DegradeReason),
}

/// Why contract resolution fell back to the free tier.
#[derive(Debug)]
pub enum DegradeReason {
    /// No proof parameter, or it named contract zero.
    NoContract,
    /// Contract lookup failed (miss or store failure).
    ContractLookup(StoreError),
    /// Policy lookup failed with something other than a miss.
    ConfigLookup(StoreError),
    /// The direct-proof replay mark could not be read.
    ReplayMarkLookup(StoreError),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoContract => f.write_str("no contract named"),
            Self::ContractLookup(e) => write!(f, "failed to fetch contract: {e}"),
            Self::ConfigLookup(e) => write!(f, "failed to fetch contract configuration: {e}"),
            Self::ReplayMarkLookup(e) => write!(f, "failed to fetch replay mark: {e}"),
        }
    }
}

/// What the pipeline decided for a request.
#[derive(Debug)]
pub enum Outcome {
    /// Pass the request to the backend.
    Forward,
    /// Answer immediately.
    Deny(Denial),
}

/// Full pipeline decision including the response headers to set.
#[derive(Debug)]
pub struct AccessDecision {
    /// CORS policy of the resolved contract.
    pub cors: Option<Cors>,
    /// Value of the `tier` header, if the request reached tier evaluation.
    pub tier: Option<Tier>,
    /// Forward or deny.
    pub outcome: Outcome,
}

impl AccessDecision {
    pub(crate) fn deny(cors: Option<Cors>, tier: Option<Tier>, denial: Denial) -> Self {
        Self {
            cors,
            tier,
            outcome: Outcome::Deny(denial),
        }
    }

    pub(crate) fn forward(cors: Option<Cors>, tier: Tier) -> Self {
        Self {
            cors,
            tier: Some(tier),
            outcome: Outcome::Forward,
        }
    }

    /// Tier the request is forwarded at, or `None` if denied.
    #[must_use]
    pub fn forwarded_tier(&self) -> Option<Tier> {
        match self.outcome {
            Outcome::Forward => self.tier,
            Outcome::Deny(_) => None,
        }
    }

    /// Status of a denial, if denied.
    #[must_use]
    pub fn denied_status(&self) -> Option<StatusCode> {
        match &self.outcome {
            Outcome::Forward => None,
            Outcome::Deny(denial) => Some(denial.status()),
        }
    }
}

/// Counters of pipeline decisions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GatewayStats {
    /// Requests forwarded at the paid tier.
    pub paid: u64,
    /// Requests forwarded at the free tier.
    pub free: u64,
    /// Requests denied.
    pub denied: u64,
}

impl GatewayStats {
    /// Share of forwarded requests served at the paid tier, as a percentage.
    #[must_use]
    pub fn paid_rate(&self) -> f64 {
        let total = self.paid + self.free;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = (self.paid as f64 / total as f64) * 100.0;
            rate
        }
    }
}
