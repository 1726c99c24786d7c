//! Per-request contract proofs.
//!
//! Two proof shapes exist on the wire:
//!
//! ```text
//! arkauth=<contract_id>:<nonce>:<signature hex>          delegated spender
//! arkcontract=<contract_id>:<timestamp>:<signature hex>  direct client
//! ```
//!
//! Both sign the canonical message `<contract_id>:<counter>`. The counter is a
//! spend nonce for delegated proofs and a wall-clock timestamp for direct ones;
//! the two never share a field.

mod codec;
mod validate;

pub use codec::{
    canonical_message, from_query, parse_delegated, parse_direct, QUERY_DELEGATED, QUERY_DIRECT,
};
pub use validate::{validate_delegated, validate_direct};

use crate::contract::Contract;
use crate::signature::{PubKey, SignatureVerifier};
use std::fmt;
use thiserror::Error;

/// Field of a proof string that failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofField {
    /// Leading contract id.
    ContractId,
    /// Delegated spend nonce.
    Nonce,
    /// Direct-client timestamp.
    Timestamp,
    /// Trailing hex signature.
    Signature,
}

impl fmt::Display for ProofField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ContractId => "contract id",
            Self::Nonce => "nonce",
            Self::Timestamp => "timestamp",
            Self::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// A proof string was present but malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} in proof: {reason}")]
pub struct ParseError {
    /// Field that failed.
    pub field: ProofField,
    /// Underlying parse failure.
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(field: ProofField, reason: impl fmt::Display) -> Self {
        Self {
            field,
            reason: reason.to_string(),
        }
    }
}

/// A well-formed proof failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Provider address could not be derived or parsed.
    #[error("invalid creator address: {0}")]
    InvalidCreator(String),
    /// Contract id zero never names a contract.
    #[error("contract id cannot be zero")]
    ZeroContractId,
    /// Delegated nonces start at one.
    #[error("nonce must be positive, got {0}")]
    NonPositiveNonce(i64),
    /// No signature supplied.
    #[error("signature is empty")]
    EmptySignature,
    /// A stored signature is not valid hex.
    #[error("stored signature is corrupt: {0}")]
    CorruptSignature(String),
    /// Signature longer than the ledger accepts.
    #[error("signature too long: {0} bytes")]
    SignatureTooLong(usize),
    /// Direct proof timestamp did not move forward.
    #[error("timestamp must be larger than {last}, got {timestamp}")]
    StaleTimestamp {
        /// Last accepted timestamp.
        last: i64,
        /// Presented timestamp.
        timestamp: i64,
    },
    /// Signature did not verify against the expected key.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// A parsed proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proof {
    /// Signed by the contract's spender over a spend nonce.
    Delegated {
        /// Contract named by the proof.
        contract_id: u64,
        /// Units consumed including this request.
        nonce: i64,
        /// Signature over `contract_id:nonce`.
        signature: Vec<u8>,
    },
    /// Signed by the contract's client over a timestamp.
    Direct {
        /// Contract named by the proof.
        contract_id: u64,
        /// Monotonic anti-replay counter.
        timestamp: i64,
        /// Signature over `contract_id:timestamp`.
        signature: Vec<u8>,
    },
}

/// Inputs a proof is validated against.
pub struct ValidationContext<'a> {
    /// This gateway's provider key.
    pub provider: &'a PubKey,
    /// Contract the proof names.
    pub contract: &'a Contract,
    /// Signature capability.
    pub verifier: &'a dyn SignatureVerifier,
}

impl Proof {
    /// Contract named by the proof.
    #[must_use]
    pub fn contract_id(&self) -> u64 {
        match self {
            Self::Delegated { contract_id, .. } | Self::Direct { contract_id, .. } => *contract_id,
        }
    }

    /// Nonce or timestamp, whichever the shape carries.
    #[must_use]
    pub fn counter(&self) -> i64 {
        match self {
            Self::Delegated { nonce, .. } => *nonce,
            Self::Direct { timestamp, .. } => *timestamp,
        }
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        match self {
            Self::Delegated { signature, .. } | Self::Direct { signature, .. } => signature,
        }
    }

    /// Whether a signature was supplied at all.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        !self.signature().is_empty()
    }

    /// The exact message the signature covers.
    #[must_use]
    pub fn message(&self) -> String {
        canonical_message(self.contract_id(), self.counter())
    }

    /// Validate against the contract the proof names.
    ///
    /// Delegated proofs are checked as a ledger claim message and against the
    /// contract's spender key; direct proofs against the client key and the
    /// contract's last accepted timestamp.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(&self, ctx: &ValidationContext<'_>) -> Result<(), ValidationError> {
        match self {
            Self::Delegated {
                contract_id,
                nonce,
                signature,
            } => validate_delegated(
                *contract_id,
                *nonce,
                signature,
                ctx.provider,
                ctx.contract.spender(),
                ctx.verifier,
            ),
            Self::Direct {
                contract_id,
                timestamp,
                signature,
            } => validate_direct(
                *contract_id,
                *timestamp,
                signature,
                ctx.contract.last_timestamp,
                &ctx.contract.client,
                ctx.verifier,
            ),
        }
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.message(), hex::encode(self.signature()))
    }
}
