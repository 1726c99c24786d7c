//! Access pipeline behavior through the HTTP surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{TestClient, TestHarness, CALLER};
use axum::body::Body;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::{Request, StatusCode};
use tollgate::contract::{Authorization, ContractConfig, ContractType, Cors};
use tollgate::{Claim, ClaimStore, ContractStore, GatewayEvent};

#[tokio::test]
async fn test_no_proof_is_served_free() {
    let harness = TestHarness::setup();

    let resp = harness.get("/mock/status").await;
    assert!(resp.reached_backend());
    assert_eq!(resp.tier(), Some("free"));
    assert!(resp.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_direct_proof_served_paid() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    let query = harness.client.direct(7, 1_700_000_000);
    let resp = harness.get(&format!("/mock/status?{query}")).await;

    assert!(resp.reached_backend(), "unexpected response: {resp:?}");
    assert_eq!(resp.tier(), Some("paid"));
    let contract = harness.cached(7);
    assert_eq!(contract.last_timestamp, 1_700_000_000);
    assert_eq!(contract.nonce, 0);
    assert!(!harness.claims.has(7));
}

#[tokio::test]
async fn test_direct_proof_replay_downgrades() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    let query = harness.client.direct(7, 1_700_000_000);

    assert_eq!(harness.get(&format!("/mock?{query}")).await.tier(), Some("paid"));
    let replay = harness.get(&format!("/mock?{query}")).await;
    assert!(replay.reached_backend());
    assert_eq!(replay.tier(), Some("free"));
}

#[tokio::test]
async fn test_delegated_proof_records_claim() {
    let mut harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    let resp = harness
        .get(&format!("/mock/blocks?{}", harness.client.delegated(7, 1)))
        .await;
    assert_eq!(resp.tier(), Some("paid"));

    let claim = harness.claims.get(7).unwrap();
    assert_eq!(claim.nonce, 1);
    assert_eq!(claim.spender, harness.client.key);
    assert_eq!(harness.cached(7).nonce, 1);

    let event = harness.events().try_recv().unwrap();
    assert_eq!(
        event,
        GatewayEvent::ClaimRecorded {
            contract_id: 7,
            nonce: 1
        }
    );
}

#[tokio::test]
async fn test_nonces_commit_monotonically() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    let tiers = [
        (1, "paid"),
        (3, "paid"),
        (2, "free"),
        (3, "free"),
        (4, "paid"),
    ];
    for (nonce, expected) in tiers {
        let resp = harness
            .get(&format!("/mock?{}", harness.client.delegated(7, nonce)))
            .await;
        assert_eq!(resp.tier(), Some(expected), "nonce {nonce}");
        assert!(resp.reached_backend());
    }

    assert_eq!(harness.claims.get(7).unwrap().nonce, 4);
    assert_eq!(harness.cached(7).nonce, 4);
}

#[tokio::test]
async fn test_deposit_covers_exact_spend() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    let at_limit = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 10)))
        .await;
    assert_eq!(at_limit.tier(), Some("paid"));

    let over = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 11)))
        .await;
    assert_eq!(over.tier(), Some("free"));
    assert_eq!(harness.claims.get(7).unwrap().nonce, 10);
}

#[tokio::test]
async fn test_subscription_ignores_deposit() {
    let harness = TestHarness::setup();
    let mut contract = harness.contract(7);
    contract.contract_type = ContractType::Subscription;
    contract.deposit = None;
    harness.add_contract(contract);

    let resp = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1_000)))
        .await;
    assert_eq!(resp.tier(), Some("paid"));
}

#[tokio::test]
async fn test_expired_contract_served_free() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    harness.contracts.set_height(110);
    assert_eq!(
        harness
            .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
            .await
            .tier(),
        Some("paid")
    );

    harness.contracts.set_height(111);
    assert_eq!(
        harness
            .get(&format!("/mock?{}", harness.client.delegated(7, 2)))
            .await
            .tier(),
        Some("free")
    );
    assert_eq!(harness.claims.get(7).unwrap().nonce, 1);
}

#[tokio::test]
async fn test_wrong_signer_served_free() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    let stranger = TestClient::generate();

    let resp = harness
        .get(&format!("/mock?{}", stranger.delegated(7, 1)))
        .await;
    assert!(resp.reached_backend());
    assert_eq!(resp.tier(), Some("free"));
    assert!(!harness.claims.has(7));
}

#[tokio::test]
async fn test_delegate_signs_instead_of_client() {
    let harness = TestHarness::setup();
    let delegate = TestClient::generate();
    let mut contract = harness.contract(7);
    contract.delegate = Some(delegate.key.clone());
    harness.add_contract(contract);

    let by_client = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
        .await;
    assert_eq!(by_client.tier(), Some("free"));

    let by_delegate = harness
        .get(&format!("/mock?{}", delegate.delegated(7, 1)))
        .await;
    assert_eq!(by_delegate.tier(), Some("paid"));
    assert_eq!(harness.claims.get(7).unwrap().spender, delegate.key);
}

#[tokio::test]
async fn test_unknown_contract_served_free() {
    let harness = TestHarness::setup();

    let resp = harness
        .get(&format!("/mock?{}", harness.client.delegated(42, 1)))
        .await;
    assert!(resp.reached_backend());
    assert_eq!(resp.tier(), Some("free"));
}

#[tokio::test]
async fn test_open_contract_without_signature() {
    let harness = TestHarness::setup();
    let mut contract = harness.contract(7);
    contract.authorization = Authorization::Open;
    harness.add_contract(contract);

    let resp = harness.get("/mock/status?arkauth=7").await;
    assert!(resp.reached_backend());
    assert_eq!(resp.tier(), Some("paid"));
    assert!(!harness.claims.has(7));
    assert_eq!(harness.cached(7).nonce, 0);
}

#[tokio::test]
async fn test_malformed_proof_is_bad_request() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    for query in ["arkauth=seven", "arkauth=7:x:00", "arkcontract=7:1:zz"] {
        let resp = harness.get(&format!("/mock?{query}")).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{query}");
        assert!(resp.tier().is_none());
        assert!(!resp.body.starts_with("backend "));
    }
}

#[tokio::test]
async fn test_allowlist_forbids_other_callers() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    harness.configs.put(ContractConfig {
        contract_id: 7,
        whitelist_ip_addresses: vec!["198.51.100.1".to_string()],
        ..Default::default()
    });

    let query = format!("/mock?{}", harness.client.delegated(7, 1));
    let denied = harness.get(&query).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body, "Forbidden");

    let allowed = harness.get_from(&query, "198.51.100.1").await;
    assert_eq!(allowed.tier(), Some("paid"));
}

#[tokio::test]
async fn test_forwarded_headers_decide_caller() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    harness.configs.put(ContractConfig {
        contract_id: 7,
        whitelist_ip_addresses: vec!["198.51.100.1".to_string()],
        ..Default::default()
    });

    let req = Request::builder()
        .uri(format!("/mock?{}", harness.client.delegated(7, 1)))
        .header("x-forwarded-for", "198.51.100.1, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    let resp = harness.send(req).await;
    assert_eq!(resp.tier(), Some("paid"));

    let req = Request::builder()
        .uri(format!("/mock?{}", harness.client.delegated(7, 2)))
        .header("x-real-ip", CALLER)
        .header("x-forwarded-for", "198.51.100.1")
        .body(Body::empty())
        .unwrap();
    assert_eq!(harness.send(req).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_per_user_rate_limit() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    harness.configs.put(ContractConfig {
        contract_id: 7,
        per_user_rate_limit: 2,
        ..Default::default()
    });

    for nonce in 1..=2 {
        let resp = harness
            .get(&format!("/mock?{}", harness.client.delegated(7, nonce)))
            .await;
        assert_eq!(resp.tier(), Some("paid"));
    }
    let limited = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 3)))
        .await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);

    // a different caller has its own bucket
    let other = harness
        .get_from(
            &format!("/mock?{}", harness.client.delegated(7, 3)),
            "198.51.100.9",
        )
        .await;
    assert_eq!(other.tier(), Some("paid"));
}

#[tokio::test]
async fn test_contract_throttle_downgrades() {
    let harness = TestHarness::setup();
    let mut contract = harness.contract(7);
    contract.queries_per_minute = 1;
    harness.add_contract(contract);

    let first = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
        .await;
    assert_eq!(first.tier(), Some("paid"));

    let second = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 2)))
        .await;
    assert!(second.reached_backend());
    assert_eq!(second.tier(), Some("free"));
    assert_eq!(harness.cached(7).nonce, 1);
}

#[tokio::test]
async fn test_service_mismatch_unauthorized() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    let resp = harness
        .get(&format!("/other/status?{}", harness.client.delegated(7, 1)))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.tier(), Some("paid"));
    assert!(!harness.claims.has(7));
}

#[tokio::test]
async fn test_cors_headers_from_config() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    harness.configs.put(ContractConfig {
        contract_id: 7,
        cors: Cors {
            allow_origins: vec!["https://a.example".to_string(), "https://b.example".to_string()],
            allow_methods: vec!["GET".to_string(), "POST".to_string()],
            allow_headers: vec!["Content-Type".to_string()],
        },
        ..Default::default()
    });

    let resp = harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
        .await;
    assert_eq!(
        resp.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://a.example, https://b.example"
    );
    assert_eq!(
        resp.headers.get("access-control-allow-methods").unwrap(),
        "GET, POST"
    );
    assert_eq!(
        resp.headers.get("access-control-allow-headers").unwrap(),
        "Content-Type"
    );
}

#[tokio::test]
async fn test_free_tier_limit() {
    let harness = TestHarness::setup_with_free_tier(2);

    assert!(harness.get("/mock").await.reached_backend());
    assert!(harness.get("/mock").await.reached_backend());

    let limited = harness.get("/mock").await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.tier(), Some("free"));

    assert!(harness.get_from("/mock", "198.51.100.9").await.reached_backend());

    let stats = harness.gateway().stats();
    assert_eq!(stats.free, 3);
    assert_eq!(stats.denied, 1);
}

#[tokio::test]
async fn test_paid_tier_not_charged_to_free_quota() {
    let harness = TestHarness::setup_with_free_tier(1);
    harness.add_contract(harness.contract(7));

    for nonce in 1..=3 {
        let resp = harness
            .get(&format!("/mock?{}", harness.client.delegated(7, nonce)))
            .await;
        assert_eq!(resp.tier(), Some("paid"));
    }
    assert!(harness.get("/mock").await.reached_backend());
}

#[tokio::test]
async fn test_concurrent_proofs_on_one_contract() {
    let harness = TestHarness::setup();
    let mut contract = harness.contract(7);
    contract.deposit = Some(1_000);
    harness.add_contract(contract);

    let queries: Vec<String> = (1..=10)
        .map(|nonce| format!("/mock?{}", harness.client.delegated(7, nonce)))
        .collect();
    let responses =
        futures::future::join_all(queries.iter().map(|query| harness.get(query))).await;

    assert!(responses.iter().all(super::TestResponse::reached_backend));
    let claim = harness.claims.get(7).unwrap();
    assert_eq!(claim.nonce, harness.cached(7).nonce);
    assert!(claim.nonce >= 1);
}

#[tokio::test]
async fn test_settlement_endpoints() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));
    harness.add_contract(harness.contract(8));

    harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 2)))
        .await;
    harness
        .get(&format!("/mock?{}", harness.client.delegated(8, 1)))
        .await;

    let resp = harness.get("/claims").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(resp.tier().is_none());
    let pending: Vec<Claim> = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(
        pending.iter().map(|c| c.contract_id).collect::<Vec<_>>(),
        vec![7, 8]
    );

    assert!(harness.claims.mark_claimed(7, 2).unwrap());
    let pending: Vec<Claim> = serde_json::from_str(&harness.get("/claims").await.body).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].contract_id, 8);

    let claim: Claim = serde_json::from_str(&harness.get("/claim/7").await.body).unwrap();
    assert!(claim.claimed);
    assert_eq!(claim.nonce, 2);

    assert_eq!(harness.get("/claim/99").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settling_stale_snapshot_keeps_newer_claim_pending() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
        .await;
    let snapshot: Vec<Claim> = serde_json::from_str(&harness.get("/claims").await.body).unwrap();
    assert_eq!(snapshot[0].nonce, 1);

    harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 2)))
        .await;

    assert!(!harness.claims.mark_claimed(7, snapshot[0].nonce).unwrap());
    let pending: Vec<Claim> = serde_json::from_str(&harness.get("/claims").await.body).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].nonce, 2);
}

#[tokio::test]
async fn test_new_proof_reopens_claimed_claim() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
        .await;
    assert!(harness.claims.mark_claimed(7, 1).unwrap());
    harness
        .get(&format!("/mock?{}", harness.client.delegated(7, 2)))
        .await;

    let claim = harness.claims.get(7).unwrap();
    assert_eq!(claim.nonce, 2);
    assert!(!claim.claimed);
    assert!(claim.to_message(&harness.provider.address()).is_ok());
}

#[tokio::test]
async fn test_contract_update_from_ledger_is_honored() {
    let harness = TestHarness::setup();
    harness.add_contract(harness.contract(7));

    assert_eq!(
        harness
            .get(&format!("/mock?{}", harness.client.delegated(7, 1)))
            .await
            .tier(),
        Some("paid")
    );

    // ledger reports a settled nonce ahead of the local claim
    let mut contract = harness.contracts.get(7).unwrap();
    contract.nonce = 5;
    harness.contracts.put(contract).unwrap();

    assert_eq!(
        harness
            .get(&format!("/mock?{}", harness.client.delegated(7, 5)))
            .await
            .tier(),
        Some("free")
    );
    assert_eq!(
        harness
            .get(&format!("/mock?{}", harness.client.delegated(7, 6)))
            .await
            .tier(),
        Some("paid")
    );
}
