//! Per-contract serialization of the paid-tier commit.
//!
//! Checking a nonce against the last claim and writing the new claim must
//! happen as one step per contract, otherwise two concurrent proofs with
//! increasing nonces could both pass the check. A fixed table of striped
//! mutexes bounds memory; contracts sharing a stripe merely serialize with
//! each other.

use parking_lot::{Mutex, MutexGuard};

const STRIPES: usize = 64;

/// Striped lock table keyed by contract id.
pub struct ContractLocks {
    stripes: [Mutex<()>; STRIPES],
}

impl ContractLocks {
    /// Create an unlocked table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stripes: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    /// Block until the contract's stripe is held.
    pub fn lock(&self, contract_id: u64) -> MutexGuard<'_, ()> {
        #[allow(clippy::cast_possible_truncation)]
        let stripe = (contract_id % STRIPES as u64) as usize;
        self.stripes[stripe].lock()
    }
}

impl Default for ContractLocks {
    fn default() -> Self {
        Self::new()
    }
}
