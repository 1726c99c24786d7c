//! In-process gateway harness.
//!
//! The `TestHarness` wires a [`Gateway`] over in-memory stores in front of an
//! echo backend and drives it through the full axum router, so every test
//! exercises the middleware, header handling and settlement endpoints exactly
//! as a deployed gateway would.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::Router;
use saorsa_pqc::api::sig::MlDsaSecretKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tollgate::event::create_event_channel;
use tollgate::proof::canonical_message;
use tollgate::signature::{generate_keypair, sign};
use tollgate::store::{MemoryClaimStore, MemoryConfigStore, MemoryContractStore};
use tollgate::{
    router, Authorization, Contract, ContractStore, ContractType, Gateway, GatewayEventsChannel,
    Proof, PubKey, Stores,
};
use tower::ServiceExt;

/// Default caller address.
pub const CALLER: &str = "203.0.113.7";

/// Height the ledger is observed at after setup.
pub const START_HEIGHT: i64 = 20;

/// Response captured from the router.
#[derive(Debug)]
pub struct TestResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body as text.
    pub body: String,
}

impl TestResponse {
    /// Value of the `tier` header, if set.
    pub fn tier(&self) -> Option<&str> {
        self.headers
            .get(tollgate::gateway::TIER_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the backend answered.
    pub fn reached_backend(&self) -> bool {
        self.status == StatusCode::OK && self.body.starts_with("backend ")
    }
}

/// A contract client holding its signing key.
pub struct TestClient {
    /// Public key registered on contracts.
    pub key: PubKey,
    secret: MlDsaSecretKey,
}

impl TestClient {
    /// Generate a fresh client.
    pub fn generate() -> Self {
        let (key, secret) = generate_keypair().expect("keypair");
        Self { key, secret }
    }

    /// `arkauth` query for a delegated proof.
    pub fn delegated(&self, contract_id: u64, nonce: i64) -> String {
        let signature = sign(&self.secret, canonical_message(contract_id, nonce).as_bytes())
            .expect("sign");
        let proof = Proof::Delegated {
            contract_id,
            nonce,
            signature,
        };
        format!("arkauth={proof}")
    }

    /// `arkcontract` query for a direct proof.
    pub fn direct(&self, contract_id: u64, timestamp: i64) -> String {
        let signature = sign(&self.secret, canonical_message(contract_id, timestamp).as_bytes())
            .expect("sign");
        let proof = Proof::Direct {
            contract_id,
            timestamp,
            signature,
        };
        format!("arkcontract={proof}")
    }
}

/// Gateway over in-memory stores in front of an echo backend.
pub struct TestHarness {
    /// Contract cache.
    pub contracts: Arc<MemoryContractStore>,
    /// Claim store.
    pub claims: Arc<MemoryClaimStore>,
    /// Policy store.
    pub configs: Arc<MemoryConfigStore>,
    /// Provider key contracts are served for.
    pub provider: PubKey,
    /// Default contract client.
    pub client: TestClient,
    gateway: Arc<Gateway>,
    app: Router,
    events: GatewayEventsChannel,
}

impl TestHarness {
    /// Harness with a generous free tier.
    pub fn setup() -> Self {
        Self::setup_with_free_tier(1_000)
    }

    /// Harness with the given free-tier quota per minute.
    pub fn setup_with_free_tier(free_tier_rate_limit: u32) -> Self {
        let (provider, _) = generate_keypair().expect("keypair");
        let contracts = Arc::new(MemoryContractStore::new());
        contracts.set_height(START_HEIGHT);
        let claims = Arc::new(MemoryClaimStore::new());
        let configs = Arc::new(MemoryConfigStore::new());

        let (events_tx, events) = create_event_channel();
        let stores = Stores {
            contracts: contracts.clone(),
            claims: claims.clone(),
            configs: configs.clone(),
        };
        let gateway = Arc::new(
            Gateway::new(provider.clone(), free_tier_rate_limit, stores).with_events(events_tx),
        );

        let backend = Router::new().fallback(|uri: Uri| async move { format!("backend {uri}") });
        let app = router(Arc::clone(&gateway), backend);

        Self {
            contracts,
            claims,
            configs,
            provider,
            client: TestClient::generate(),
            gateway,
            app,
            events,
        }
    }

    /// A funded pay-as-you-go contract for the default client on service `mock`.
    ///
    /// Deposit 100 at rate 10, opened at height 10 for 100 blocks.
    pub fn contract(&self, id: u64) -> Contract {
        Contract {
            id,
            provider: self.provider.clone(),
            service: "mock".parse().expect("service"),
            client: self.client.key.clone(),
            delegate: None,
            contract_type: ContractType::PayAsYouGo,
            authorization: Authorization::Restricted,
            height: 10,
            duration: 100,
            settlement_duration: 10,
            rate: 10,
            deposit: Some(100),
            nonce: 0,
            queries_per_minute: 600,
            last_timestamp: 0,
        }
    }

    /// Cache a contract.
    pub fn add_contract(&self, contract: Contract) {
        self.contracts.put(contract).expect("put contract");
    }

    /// Read back a cached contract.
    pub fn cached(&self, id: u64) -> Contract {
        self.contracts.get(id).expect("cached contract")
    }

    /// The pipeline under test.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Gateway event receiver.
    pub fn events(&mut self) -> &mut GatewayEventsChannel {
        &mut self.events
    }

    /// GET `uri` from the default caller.
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.get_from(uri, CALLER).await
    }

    /// GET `uri` with the peer address set to `remote`.
    pub async fn get_from(&self, uri: &str, remote: &str) -> TestResponse {
        let peer: SocketAddr = format!("{remote}:40000").parse().expect("peer address");
        let mut req = Request::builder().uri(uri).body(Body::empty()).expect("request");
        req.extensions_mut().insert(ConnectInfo(peer));
        self.send(req).await
    }

    /// Send an arbitrary request through the router.
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(req).await.expect("infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}
