//! Claims: the gateway's record of the latest accepted proof per contract.
//!
//! A claim is what the settlement submitter later turns into a ledger
//! [`ClaimIncomeMsg`]. Claims are created on the first accepted delegated
//! proof for a contract and overwritten in place by each later one.

use crate::proof::ValidationError;
use crate::signature::{Address, PubKey};
use serde::{Deserialize, Serialize};

/// Upper bound on an encoded proof signature accepted by the ledger.
pub const MAX_SIGNATURE_LEN: usize = 4096;

/// Latest accepted proof for a contract, pending settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Contract the claim settles against.
    pub contract_id: u64,
    /// Key that signed the proof.
    pub spender: PubKey,
    /// Proof nonce; strictly increases across updates.
    pub nonce: i64,
    /// Hex-encoded proof signature.
    pub signature: String,
    /// Whether the claim was submitted to the ledger.
    pub claimed: bool,
}

impl Claim {
    /// Create an unsubmitted claim.
    #[must_use]
    pub fn new(contract_id: u64, spender: PubKey, nonce: i64, signature: &[u8]) -> Self {
        Self {
            contract_id,
            spender,
            nonce,
            signature: hex::encode(signature),
            claimed: false,
        }
    }

    /// Overwrite with a newer proof and mark it unsubmitted.
    pub fn update(&mut self, nonce: i64, signature: &[u8]) {
        self.nonce = nonce;
        self.signature = hex::encode(signature);
        self.claimed = false;
    }

    /// Build the ledger message submitting this claim on behalf of `creator`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::CorruptSignature`] if the stored signature
    /// is not valid hex, or the error from basic validation of the message.
    pub fn to_message(&self, creator: &Address) -> Result<ClaimIncomeMsg, ValidationError> {
        let signature = hex::decode(&self.signature)
            .map_err(|e| ValidationError::CorruptSignature(e.to_string()))?;
        let msg = ClaimIncomeMsg::new(creator, self.contract_id, self.nonce, signature);
        msg.validate_basic()?;
        Ok(msg)
    }
}

/// Ledger message claiming contract income for a signed proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimIncomeMsg {
    /// Hex address of the provider submitting the claim.
    pub creator: String,
    /// Contract being claimed against.
    pub contract_id: u64,
    /// Units consumed.
    pub nonce: i64,
    /// Spender's signature over `contract_id:nonce`.
    pub signature: Vec<u8>,
}

impl ClaimIncomeMsg {
    /// Assemble a message.
    #[must_use]
    pub fn new(creator: &Address, contract_id: u64, nonce: i64, signature: Vec<u8>) -> Self {
        Self {
            creator: creator.to_string(),
            contract_id,
            nonce,
            signature,
        }
    }

    /// Stateless checks the ledger applies before accepting the message.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate_basic(&self) -> Result<(), ValidationError> {
        Address::from_hex(&self.creator)
            .map_err(|e| ValidationError::InvalidCreator(e.to_string()))?;
        if self.contract_id == 0 {
            return Err(ValidationError::ZeroContractId);
        }
        if self.nonce <= 0 {
            return Err(ValidationError::NonPositiveNonce(self.nonce));
        }
        if self.signature.is_empty() {
            return Err(ValidationError::EmptySignature);
        }
        if self.signature.len() > MAX_SIGNATURE_LEN {
            return Err(ValidationError::SignatureTooLong(self.signature.len()));
        }
        Ok(())
    }
}
