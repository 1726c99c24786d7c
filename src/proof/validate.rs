//! Stateless proof validation.
//!
//! Validators take everything they need as arguments and touch no store, so
//! freshness bounds (last timestamp, last claim) are the caller's to supply.

use super::{canonical_message, ValidationError};
use crate::claim::ClaimIncomeMsg;
use crate::signature::{PubKey, SignatureVerifier};

/// Validate a delegated-spender proof.
///
/// The proof must form a valid ledger claim message for this gateway's
/// provider (so anything accepted here can later be settled) and its
/// signature must verify against the contract's spender key.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_delegated(
    contract_id: u64,
    nonce: i64,
    signature: &[u8],
    provider: &PubKey,
    spender: &PubKey,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ValidationError> {
    let creator = provider.address();
    ClaimIncomeMsg::new(&creator, contract_id, nonce, signature.to_vec()).validate_basic()?;

    let message = canonical_message(contract_id, nonce);
    verifier
        .verify(spender, message.as_bytes(), signature)
        .map_err(|e| ValidationError::InvalidSignature(e.to_string()))
}

/// Validate a direct-client proof against the last accepted timestamp.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_direct(
    contract_id: u64,
    timestamp: i64,
    signature: &[u8],
    last_timestamp: i64,
    client: &PubKey,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ValidationError> {
    if contract_id == 0 {
        return Err(ValidationError::ZeroContractId);
    }
    if timestamp <= last_timestamp {
        return Err(ValidationError::StaleTimestamp {
            last: last_timestamp,
            timestamp,
        });
    }

    let message = canonical_message(contract_id, timestamp);
    verifier
        .verify(client, message.as_bytes(), signature)
        .map_err(|e| ValidationError::InvalidSignature(e.to_string()))
}
