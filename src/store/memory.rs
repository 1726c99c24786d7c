//! In-memory stores.

use super::{ClaimStore, ConfigStore, ContractStore, StoreError, StoreResult};
use crate::claim::Claim;
use crate::contract::{Contract, ContractConfig};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

/// Contract cache held in memory, fed by the ledger watcher.
#[derive(Debug, Default)]
pub struct MemoryContractStore {
    contracts: RwLock<HashMap<u64, Contract>>,
    height: AtomicI64,
}

impl MemoryContractStore {
    /// Create an empty store at height zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly observed ledger height.
    pub fn set_height(&self, height: i64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Number of cached contracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.read().is_empty()
    }
}

impl ContractStore for MemoryContractStore {
    fn get(&self, id: u64) -> StoreResult<Contract> {
        self.contracts
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "contract",
                id,
            })
    }

    fn put(&self, contract: Contract) -> StoreResult<()> {
        self.contracts.write().insert(contract.id, contract);
        Ok(())
    }

    fn current_height(&self) -> i64 {
        self.height.load(Ordering::SeqCst)
    }
}

/// Claim store held in memory; claims are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    claims: RwLock<BTreeMap<u64, Claim>>,
    timestamps: RwLock<HashMap<u64, i64>>,
}

impl MemoryClaimStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClaimStore for MemoryClaimStore {
    fn has(&self, contract_id: u64) -> bool {
        self.claims.read().contains_key(&contract_id)
    }

    fn get(&self, contract_id: u64) -> StoreResult<Claim> {
        self.claims
            .read()
            .get(&contract_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "claim",
                id: contract_id,
            })
    }

    fn set(&self, claim: Claim) -> StoreResult<()> {
        self.claims.write().insert(claim.contract_id, claim);
        Ok(())
    }

    fn all(&self) -> StoreResult<Vec<Claim>> {
        Ok(self.claims.read().values().cloned().collect())
    }

    fn mark_claimed(&self, contract_id: u64, nonce: i64) -> StoreResult<bool> {
        let mut claims = self.claims.write();
        let claim = claims.get_mut(&contract_id).ok_or(StoreError::NotFound {
            kind: "claim",
            id: contract_id,
        })?;
        if claim.nonce != nonce {
            return Ok(false);
        }
        claim.claimed = true;
        Ok(true)
    }

    fn last_timestamp(&self, contract_id: u64) -> StoreResult<i64> {
        Ok(self
            .timestamps
            .read()
            .get(&contract_id)
            .copied()
            .unwrap_or_default())
    }

    fn set_last_timestamp(&self, contract_id: u64, timestamp: i64) -> StoreResult<()> {
        let mut timestamps = self.timestamps.write();
        let mark = timestamps.entry(contract_id).or_default();
        *mark = (*mark).max(timestamp);
        Ok(())
    }
}

/// Contract policies held in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    configs: RwLock<HashMap<u64, ContractConfig>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the policy for `config.contract_id`.
    pub fn put(&self, config: ContractConfig) {
        self.configs.write().insert(config.contract_id, config);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, contract_id: u64) -> StoreResult<ContractConfig> {
        self.configs
            .read()
            .get(&contract_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "contract config",
                id: contract_id,
            })
    }
}
