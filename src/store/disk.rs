//! Durable claim storage.
//!
//! One MessagePack record per contract, plus the direct-proof replay mark:
//!
//! ```text
//! {root}/claims/{contract_id}.claim
//! {root}/claims/{contract_id}.stamp
//! ```
//!
//! Writes go to a temp file and are renamed into place, so a crash never
//! leaves a half-written record behind. All writes hold one store-wide lock,
//! so a settlement mark cannot interleave with a commit for the same contract.

use super::{ClaimStore, StoreError, StoreResult};
use crate::claim::Claim;
use crate::error::Result;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const CLAIM_EXTENSION: &str = "claim";
const STAMP_EXTENSION: &str = "stamp";

/// Claim store persisting each claim to its own file.
#[derive(Debug)]
pub struct DiskClaimStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskClaimStore {
    /// Open (creating if needed) the claim directory under `root_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root_dir: &Path) -> Result<Self> {
        let dir = root_dir.join("claims");
        fs::create_dir_all(&dir)?;
        debug!("Initialized claim storage at {:?}", dir);
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn claim_path(&self, contract_id: u64) -> PathBuf {
        self.dir.join(format!("{contract_id}.{CLAIM_EXTENSION}"))
    }

    fn stamp_path(&self, contract_id: u64) -> PathBuf {
        self.dir.join(format!("{contract_id}.{STAMP_EXTENSION}"))
    }

    /// Write `bytes` to `path` through a temp file. Caller holds `write_lock`.
    fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let mut file = fs::File::create(&temp_path)
            .map_err(|e| StoreError::Io(format!("Failed to create temp file: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| StoreError::Io(format!("Failed to write {}: {e}", path.display())))?;
        file.sync_all()
            .map_err(|e| StoreError::Io(format!("Failed to flush {}: {e}", path.display())))?;

        fs::rename(&temp_path, path)
            .map_err(|e| StoreError::Io(format!("Failed to rename temp file: {e}")))
    }

    fn write_claim(&self, claim: &Claim) -> StoreResult<()> {
        let bytes =
            rmp_serde::to_vec_named(claim).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Self::write_atomic(&self.claim_path(claim.contract_id), &bytes)
    }

    fn read_stamp(&self, contract_id: u64) -> StoreResult<i64> {
        let path = self.stamp_path(contract_id);
        if !path.exists() {
            return Ok(0);
        }
        let bytes = fs::read(&path)
            .map_err(|e| StoreError::Io(format!("Failed to read {}: {e}", path.display())))?;
        rmp_serde::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }

    fn read(path: &Path) -> StoreResult<Claim> {
        let bytes = fs::read(path)
            .map_err(|e| StoreError::Io(format!("Failed to read claim {}: {e}", path.display())))?;
        rmp_serde::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))
    }
}

impl ClaimStore for DiskClaimStore {
    fn has(&self, contract_id: u64) -> bool {
        self.claim_path(contract_id).exists()
    }

    fn get(&self, contract_id: u64) -> StoreResult<Claim> {
        let path = self.claim_path(contract_id);
        if !path.exists() {
            trace!("Claim for contract {} not found", contract_id);
            return Err(StoreError::NotFound {
                kind: "claim",
                id: contract_id,
            });
        }
        Self::read(&path)
    }

    fn set(&self, claim: Claim) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.write_claim(&claim)?;

        trace!(
            "Stored claim for contract {} (nonce {})",
            claim.contract_id,
            claim.nonce
        );
        Ok(())
    }

    fn all(&self) -> StoreResult<Vec<Claim>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| StoreError::Io(format!("Failed to list claims: {e}")))?;

        let mut claims = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::Io(format!("Failed to list claims: {e}")))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CLAIM_EXTENSION) {
                continue;
            }
            match Self::read(&path) {
                Ok(claim) => claims.push(claim),
                Err(e) => warn!("Skipping unreadable claim: {}", e),
            }
        }
        claims.sort_by_key(|c| c.contract_id);
        Ok(claims)
    }

    fn mark_claimed(&self, contract_id: u64, nonce: i64) -> StoreResult<bool> {
        let _guard = self.write_lock.lock();
        let mut claim = self.get(contract_id)?;
        if claim.nonce != nonce {
            debug!(
                "Claim for contract {} moved to nonce {}; not marking {}",
                contract_id, claim.nonce, nonce
            );
            return Ok(false);
        }
        claim.claimed = true;
        self.write_claim(&claim)?;
        Ok(true)
    }

    fn last_timestamp(&self, contract_id: u64) -> StoreResult<i64> {
        self.read_stamp(contract_id)
    }

    fn set_last_timestamp(&self, contract_id: u64, timestamp: i64) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        if self.read_stamp(contract_id)? >= timestamp {
            return Ok(());
        }
        let bytes =
            rmp_serde::to_vec(&timestamp).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Self::write_atomic(&self.stamp_path(contract_id), &bytes)
    }
}
