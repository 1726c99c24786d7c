//! Collaborator stores the access pipeline reads and writes.
//!
//! The pipeline needs only get/put/has semantics from these. Implementations
//! must be safe to share across request tasks; per-contract consistency of the
//! commit step is provided by the pipeline's own contract locks, not here.

mod disk;
mod memory;

pub use disk::DiskClaimStore;
pub use memory::{MemoryClaimStore, MemoryConfigStore, MemoryContractStore};

use crate::claim::Claim;
use crate::contract::{Contract, ContractConfig};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record for the key.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Key looked up.
        id: u64,
    },

    /// Backing storage failed.
    #[error("storage I/O failure: {0}")]
    Io(String),

    /// A stored record could not be encoded or decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether this is a plain miss rather than a failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Local cache of ledger contracts.
pub trait ContractStore: Send + Sync {
    /// Fetch a contract by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the contract is not cached.
    fn get(&self, id: u64) -> StoreResult<Contract>;

    /// Insert or replace a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, contract: Contract) -> StoreResult<()>;

    /// Latest ledger height observed.
    fn current_height(&self) -> i64;
}

/// Last recorded claim per contract, plus the direct-proof replay mark.
///
/// Both records are owned by the gateway and survive ledger refreshes of the
/// contract cache.
pub trait ClaimStore: Send + Sync {
    /// Whether a claim exists for the contract.
    fn has(&self, contract_id: u64) -> bool;

    /// Fetch the claim for a contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no claim was recorded.
    fn get(&self, contract_id: u64) -> StoreResult<Claim>;

    /// Insert or replace the claim for `claim.contract_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, claim: Claim) -> StoreResult<()>;

    /// All recorded claims, ordered by contract id.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    fn all(&self) -> StoreResult<Vec<Claim>>;

    /// Claims not yet submitted to the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    fn pending(&self) -> StoreResult<Vec<Claim>> {
        Ok(self.all()?.into_iter().filter(|c| !c.claimed).collect())
    }

    /// Mark the claim at `nonce` as submitted.
    ///
    /// Returns `false` without changing anything when the stored claim has
    /// moved past `nonce`; that newer claim still awaits settlement. The
    /// compare and the write are atomic with respect to [`ClaimStore::set`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no claim was recorded.
    fn mark_claimed(&self, contract_id: u64, nonce: i64) -> StoreResult<bool>;

    /// Highest direct-proof timestamp accepted for the contract, zero if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    fn last_timestamp(&self, contract_id: u64) -> StoreResult<i64>;

    /// Record an accepted direct-proof timestamp. Never lowers the stored mark.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set_last_timestamp(&self, contract_id: u64, timestamp: i64) -> StoreResult<()>;
}

/// Per-contract gateway policy.
pub trait ConfigStore: Send + Sync {
    /// Fetch the policy for a contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no policy was configured.
    fn get(&self, contract_id: u64) -> StoreResult<ContractConfig>;
}
