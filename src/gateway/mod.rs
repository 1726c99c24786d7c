//! Access decision pipeline.
//!
//! Every request in front of a metered backend is classified into one of:
//!
//! - **Paid tier**: a valid proof for a live, funded contract. The proof's
//!   nonce is committed as a claim before the request is forwarded.
//! - **Free tier**: anything else, rate limited per caller address.
//! - **Denied**: malformed proof, allowlist or per-user limit violations,
//!   service mismatch, commit failure or an exhausted free tier.

mod decision;
mod locks;
pub mod middleware;
mod pipeline;

pub use decision::{
    AccessDecision, DegradeReason, Denial, GatewayStats, Outcome, PaidRejection, Resolution, Tier,
};
pub use locks::ContractLocks;
pub use middleware::{authorize, remote_addr, TIER_HEADER};
pub use pipeline::{AccessRequest, Gateway, Stores};
