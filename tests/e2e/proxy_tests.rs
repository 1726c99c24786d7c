//! Full gateway in front of a real upstream over TCP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::TestClient;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tollgate::contract::{Authorization, ContractType};
use tollgate::signature::generate_keypair;
use tollgate::{Contract, ContractStore, GatewayBuilder, GatewayConfig, GatewayEvent};

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new().fallback(|method: Method, uri: Uri| async move {
        format!("{method} {uri}")
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct Running {
    addr: SocketAddr,
    client: TestClient,
    shutdown: std::sync::Arc<tokio::sync::watch::Sender<bool>>,
    events: tollgate::GatewayEventsChannel,
    task: JoinHandle<tollgate::Result<()>>,
    _root: tempfile::TempDir,
}

async fn spawn_gateway(upstream: &str) -> Running {
    let root = tempfile::tempdir().unwrap();
    let (provider, _) = generate_keypair().unwrap();
    let client = TestClient::generate();

    let config = GatewayConfig {
        root_dir: root.path().to_path_buf(),
        provider_pubkey: provider.to_hex(),
        upstream: upstream.to_string(),
        claim_store: tollgate::ClaimStoreKind::Disk,
        ..GatewayConfig::default()
    };
    let mut running = GatewayBuilder::new(config).build().unwrap();

    running.contracts().set_height(20);
    running
        .contracts()
        .put(Contract {
            id: 7,
            provider,
            service: "mock".parse().unwrap(),
            client: client.key.clone(),
            delegate: None,
            contract_type: ContractType::PayAsYouGo,
            authorization: Authorization::Restricted,
            height: 10,
            duration: 100,
            settlement_duration: 10,
            rate: 1,
            deposit: Some(1_000),
            nonce: 0,
            queries_per_minute: 600,
            last_timestamp: 0,
        })
        .unwrap();

    let events = running.events().unwrap();
    let shutdown = running.shutdown_handle();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move { running.serve(listener).await });

    Running {
        addr,
        client,
        shutdown,
        events,
        task,
        _root: root,
    }
}

impl Running {
    async fn stop(self) {
        let _ = self.shutdown.send(true);
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_forwards_without_proof_params() {
    let upstream = spawn_upstream().await;
    let mut gateway = spawn_gateway(&format!("http://{upstream}")).await;

    let event = gateway.events.recv().await.unwrap();
    assert!(matches!(event, GatewayEvent::Started { .. }));

    let url = format!(
        "http://{}/mock/blocks?height=5&{}",
        gateway.addr,
        gateway.client.delegated(7, 1)
    );
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("tier").unwrap(), "paid");
    assert_eq!(resp.text().await.unwrap(), "GET /mock/blocks?height=5");

    let free = reqwest::get(format!("http://{}/mock/blocks", gateway.addr))
        .await
        .unwrap();
    assert_eq!(free.headers().get("tier").unwrap(), "free");
    assert_eq!(free.text().await.unwrap(), "GET /mock/blocks");

    let claims: Vec<tollgate::Claim> =
        reqwest::get(format!("http://{}/claims", gateway.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].nonce, 1);

    let event = gateway.events.recv().await.unwrap();
    assert_eq!(
        event,
        GatewayEvent::ClaimRecorded {
            contract_id: 7,
            nonce: 1
        }
    );

    gateway.stop().await;
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = unused.local_addr().unwrap();
    drop(unused);

    let gateway = spawn_gateway(&format!("http://{dead}")).await;

    let resp = reqwest::get(format!("http://{}/mock", gateway.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(resp.headers().get("tier").unwrap(), "free");

    gateway.stop().await;
}

#[test]
fn test_build_rejects_bad_provider_key() {
    let root = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        root_dir: root.path().to_path_buf(),
        provider_pubkey: "abcd".to_string(),
        ..GatewayConfig::default()
    };

    assert!(GatewayBuilder::new(config).build().is_err());
}
