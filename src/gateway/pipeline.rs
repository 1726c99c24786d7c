//! The per-request access decision pipeline.
//!
//! ```text
//! START
//!   │
//!   ▼
//! RESOLVE_PROOF ── malformed ──────────────────────────────▶ DENY 400
//!   │
//!   ▼
//! RESOLVE_CONTRACT ── miss / id 0 / store failure ──┐
//!   │                                               │
//!   ▼                                               │
//! APPLY_CONTRACT_POLICY ── not allowlisted ───────────────▶ DENY 403
//!   │                  └── per-user limit ────────────────▶ DENY 429
//!   ▼                                               │
//! ELIGIBLE? ── no ──────────────────────────────────┤
//!   │                                               │
//!   ▼                                               │
//! SERVICE GATE ── mismatch ───────────────────────────────▶ DENY 401
//!   │                                               │
//!   ▼                                               │
//! PAID_PATH ── rejected ────────────────────────────┤
//!   │      └── store failure during commit ───────────────▶ DENY 500
//!   ▼                                               ▼
//! FORWARD (paid)                               FREE_PATH ── limited ──▶ DENY 429
//!                                                   │
//!                                                   ▼
//!                                              FORWARD (free)
//! ```

use super::decision::{
    AccessDecision, DegradeReason, Denial, GatewayStats, Outcome, PaidRejection, Resolution, Tier,
};
use super::locks::ContractLocks;
use crate::claim::Claim;
use crate::contract::{Contract, Service};
use crate::event::{create_event_channel, GatewayEvent, GatewayEventsSender};
use crate::proof::{self, ParseError, Proof, ValidationContext};
use crate::ratelimit::{RateLimiterRegistry, DEFAULT_REGISTRY_CAPACITY, FREE_TIER_CONTRACT};
use crate::signature::{MlDsaVerifier, PubKey, SignatureVerifier};
use crate::store::{ClaimStore, ConfigStore, ContractStore, StoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The stores the pipeline reads and writes.
#[derive(Clone)]
pub struct Stores {
    /// Contract cache.
    pub contracts: Arc<dyn ContractStore>,
    /// Claim cache.
    pub claims: Arc<dyn ClaimStore>,
    /// Contract policy store.
    pub configs: Arc<dyn ConfigStore>,
}

/// Request attributes the pipeline decides on.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Raw (still percent-encoded) query string.
    pub query: Option<&'a str>,
    /// Request path; its first segment names the service.
    pub path: &'a str,
    /// Caller address after header precedence was applied.
    pub remote_addr: &'a str,
}

/// How a request qualified for the paid tier.
enum Eligibility {
    /// The proof validated against the contract.
    Verified(Proof),
    /// Open contract; nothing was proven.
    Open,
}

/// Paid-tier failure: either fall back to free tier or stop.
enum PaidFailure {
    Rejected(PaidRejection),
    Fatal(Denial),
}

impl From<PaidRejection> for PaidFailure {
    fn from(rejection: PaidRejection) -> Self {
        Self::Rejected(rejection)
    }
}

/// Metered-access decision pipeline.
pub struct Gateway {
    provider: PubKey,
    free_tier_rate_limit: u32,
    stores: Stores,
    limiters: RateLimiterRegistry,
    locks: ContractLocks,
    verifier: Arc<dyn SignatureVerifier>,
    events: GatewayEventsSender,
    stats: Mutex<GatewayStats>,
}

impl Gateway {
    /// Create a pipeline for `provider` with the given free-tier quota per minute.
    #[must_use]
    pub fn new(provider: PubKey, free_tier_rate_limit: u32, stores: Stores) -> Self {
        let (events, _) = create_event_channel();
        Self {
            provider,
            free_tier_rate_limit,
            stores,
            limiters: RateLimiterRegistry::with_capacity(DEFAULT_REGISTRY_CAPACITY),
            locks: ContractLocks::new(),
            verifier: Arc::new(MlDsaVerifier),
            events,
            stats: Mutex::new(GatewayStats::default()),
        }
    }

    /// Bound the number of tracked rate-limit keys.
    #[must_use]
    pub fn with_limiter_capacity(mut self, capacity: usize) -> Self {
        self.limiters = RateLimiterRegistry::with_capacity(capacity);
        self
    }

    /// Replace the signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Publish events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: GatewayEventsSender) -> Self {
        self.events = events;
        self
    }

    /// This gateway's provider key.
    #[must_use]
    pub fn provider(&self) -> &PubKey {
        &self.provider
    }

    /// The claim store, for the settlement hand-off.
    #[must_use]
    pub fn claims(&self) -> &Arc<dyn ClaimStore> {
        &self.stores.claims
    }

    /// Snapshot of decision counters.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        self.stats.lock().clone()
    }

    /// Decide how to serve a request.
    pub fn authorize(&self, req: &AccessRequest<'_>) -> AccessDecision {
        let decision = self.decide(req);

        let mut stats = self.stats.lock();
        match decision.outcome {
            Outcome::Forward if decision.tier == Some(Tier::Paid) => stats.paid += 1,
            Outcome::Forward => stats.free += 1,
            Outcome::Deny(_) => stats.denied += 1,
        }

        decision
    }

    fn decide(&self, req: &AccessRequest<'_>) -> AccessDecision {
        let proof = match parse_query(req.query) {
            Ok(proof) => proof,
            Err(e) => {
                warn!("Failed to parse proof from {}: {}", req.remote_addr, e);
                return AccessDecision::deny(None, None, Denial::MalformedProof(e));
            }
        };

        let mut cors = None;
        match self.resolve(proof) {
            Resolution::Resolved {
                proof,
                contract,
                config,
            } => {
                cors = Some(config.cors.clone());

                if !config.allows(req.remote_addr) {
                    info!(
                        "Rejecting {} for contract {}: not allowlisted",
                        req.remote_addr, contract.id
                    );
                    return AccessDecision::deny(cors, None, Denial::Forbidden);
                }

                if config.per_user_rate_limit > 0
                    && self.limiters.is_rate_limited(
                        contract.id,
                        req.remote_addr,
                        config.per_user_rate_limit,
                    )
                {
                    info!(
                        "Rejecting {} for contract {}: per-user rate limit",
                        req.remote_addr, contract.id
                    );
                    return AccessDecision::deny(cors, None, Denial::ContractRateLimited);
                }

                match self.eligibility(proof, &contract) {
                    Ok(eligibility) => {
                        info!("Serving paid request from {}", req.remote_addr);

                        if let Err(denial) = check_service(req.path, &contract.service) {
                            warn!(
                                "Contract {} service mismatch for path {}",
                                contract.id, req.path
                            );
                            return AccessDecision::deny(cors, Some(Tier::Paid), denial);
                        }

                        match self.paid_tier(&eligibility, contract.id, req.remote_addr) {
                            Ok(()) => return AccessDecision::forward(cors, Tier::Paid),
                            Err(PaidFailure::Fatal(denial)) => {
                                return AccessDecision::deny(cors, Some(Tier::Paid), denial);
                            }
                            Err(PaidFailure::Rejected(rejection)) => {
                                warn!(
                                    "Failed to serve paid tier request for contract {} ({}): {}",
                                    contract.id,
                                    rejection.status(),
                                    rejection
                                );
                            }
                        }
                    }
                    Err(rejection) => {
                        debug!(
                            "Contract {} not eligible for paid tier: {}",
                            contract.id, rejection
                        );
                    }
                }
            }
            Resolution::Degraded(DegradeReason::NoContract) => {}
            Resolution::Degraded(reason) => warn!("{}", reason),
        }

        self.free_tier(cors, req.remote_addr)
    }

    fn resolve(&self, proof: Option<Proof>) -> Resolution {
        let Some(proof) = proof.filter(|p| p.contract_id() != 0) else {
            return Resolution::Degraded(DegradeReason::NoContract);
        };

        let mut contract = match self.stores.contracts.get(proof.contract_id()) {
            Ok(contract) => contract,
            Err(e) => return Resolution::Degraded(DegradeReason::ContractLookup(e)),
        };

        // The cached contract is replaced by ledger refreshes; the replay mark
        // for direct proofs lives in the claim store.
        if matches!(proof, Proof::Direct { .. }) {
            match self.stores.claims.last_timestamp(contract.id) {
                Ok(mark) => contract.last_timestamp = contract.last_timestamp.max(mark),
                Err(e) => return Resolution::Degraded(DegradeReason::ReplayMarkLookup(e)),
            }
        }

        let config = match self.stores.configs.get(contract.id) {
            Ok(config) => config,
            Err(e) if e.is_not_found() => crate::contract::ContractConfig {
                contract_id: contract.id,
                ..Default::default()
            },
            Err(e) => return Resolution::Degraded(DegradeReason::ConfigLookup(e)),
        };

        Resolution::Resolved {
            proof,
            contract: Box::new(contract),
            config,
        }
    }

    fn eligibility(&self, proof: Proof, contract: &Contract) -> Result<Eligibility, PaidRejection> {
        if proof.is_signed() {
            let ctx = ValidationContext {
                provider: &self.provider,
                contract,
                verifier: self.verifier.as_ref(),
            };
            match proof.validate(&ctx) {
                Ok(()) => return Ok(Eligibility::Verified(proof)),
                Err(e) if !contract.is_open() => return Err(PaidRejection::InvalidProof(e)),
                Err(e) => debug!("Ignoring invalid proof for open contract {}: {}", contract.id, e),
            }
        }

        if contract.is_open() {
            Ok(Eligibility::Open)
        } else {
            Err(PaidRejection::MissingProof)
        }
    }

    /// Economic checks and commit, serialized per contract.
    fn paid_tier(
        &self,
        eligibility: &Eligibility,
        contract_id: u64,
        remote_addr: &str,
    ) -> Result<(), PaidFailure> {
        let _guard = self.locks.lock(contract_id);

        let mut contract = self
            .stores
            .contracts
            .get(contract_id)
            .map_err(commit_failed)?;

        let height = self.stores.contracts.current_height();
        if contract.is_expired(height) {
            return Err(PaidRejection::Expired {
                height,
                expiration: contract.expiration(),
            }
            .into());
        }

        match eligibility {
            Eligibility::Verified(Proof::Delegated {
                nonce, signature, ..
            }) => {
                let existing = if self.stores.claims.has(contract_id) {
                    Some(self.stores.claims.get(contract_id).map_err(commit_failed)?)
                } else {
                    None
                };

                let recorded = existing
                    .as_ref()
                    .map_or(contract.nonce, |claim| claim.nonce.max(contract.nonce));
                if recorded >= *nonce {
                    return Err(PaidRejection::Replay {
                        presented: *nonce,
                        recorded,
                    }
                    .into());
                }

                self.check_spend(&contract, *nonce, remote_addr)?;

                let claim = match existing {
                    Some(mut claim) => {
                        claim.update(*nonce, signature);
                        claim
                    }
                    None => Claim::new(contract_id, contract.spender().clone(), *nonce, signature),
                };
                self.stores.claims.set(claim).map_err(commit_failed)?;

                contract.nonce = *nonce;
                self.stores.contracts.put(contract).map_err(commit_failed)?;

                debug!("Recorded claim for contract {} at nonce {}", contract_id, nonce);
                let _ = self.events.send(GatewayEvent::ClaimRecorded {
                    contract_id,
                    nonce: *nonce,
                });
            }
            Eligibility::Verified(Proof::Direct { timestamp, .. }) => {
                let recorded = self
                    .stores
                    .claims
                    .last_timestamp(contract_id)
                    .map_err(commit_failed)?
                    .max(contract.last_timestamp);
                if recorded >= *timestamp {
                    return Err(PaidRejection::StaleTimestamp {
                        presented: *timestamp,
                        recorded,
                    }
                    .into());
                }

                self.check_spend(&contract, contract.nonce, remote_addr)?;

                self.stores
                    .claims
                    .set_last_timestamp(contract_id, *timestamp)
                    .map_err(commit_failed)?;
                contract.last_timestamp = *timestamp;
                self.stores.contracts.put(contract).map_err(commit_failed)?;
            }
            Eligibility::Open => {
                self.check_spend(&contract, contract.nonce, remote_addr)?;
            }
        }

        Ok(())
    }

    fn check_spend(
        &self,
        contract: &Contract,
        nonce: i64,
        remote_addr: &str,
    ) -> Result<(), PaidRejection> {
        if !contract.affords(nonce) {
            return Err(PaidRejection::DepositExhausted);
        }

        let visitor = format!("paid:{remote_addr}");
        if self
            .limiters
            .is_rate_limited(contract.id, &visitor, contract.queries_per_minute)
        {
            return Err(PaidRejection::RateLimited);
        }

        Ok(())
    }

    fn free_tier(&self, cors: Option<crate::contract::Cors>, remote_addr: &str) -> AccessDecision {
        info!("Serving free tier request from {}", remote_addr);

        if self
            .limiters
            .is_rate_limited(FREE_TIER_CONTRACT, remote_addr, self.free_tier_rate_limit)
        {
            info!("Free tier rate limit reached for {}", remote_addr);
            return AccessDecision::deny(cors, Some(Tier::Free), Denial::FreeTierRateLimited);
        }

        AccessDecision::forward(cors, Tier::Free)
    }
}

fn commit_failed(e: StoreError) -> PaidFailure {
    error!("Paid tier commit failed: {}", e);
    PaidFailure::Fatal(Denial::CommitFailed(e))
}

fn parse_query(query: Option<&str>) -> Result<Option<Proof>, ParseError> {
    let Some(query) = query else {
        return Ok(None);
    };
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    proof::from_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// The first path segment must name the contract's service.
fn check_service(path: &str, expected: &Service) -> Result<(), Denial> {
    let segment = path.split('/').nth(1).unwrap_or_default();
    match segment.parse::<Service>() {
        Ok(service) if &service == expected => Ok(()),
        _ => Err(Denial::ServiceMismatch {
            expected: expected.to_string(),
            found: segment.to_string(),
        }),
    }
}
