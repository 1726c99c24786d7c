//! Gateway lifecycle: router assembly, listener and shutdown.

use crate::claim::Claim;
use crate::config::{ClaimStoreKind, GatewayConfig, Seed};
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GatewayEvent, GatewayEventsChannel, GatewayEventsSender};
use crate::gateway::{authorize, Gateway, Stores};
use crate::proxy::{self, Upstream};
use crate::signature::PubKey;
use crate::store::{ClaimStore, DiskClaimStore, MemoryClaimStore, MemoryConfigStore, MemoryContractStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the HTTP surface.
///
/// `backend` receives every request that passes the access pipeline. The
/// settlement endpoints `/claims` and `/claim/:id` are served outside it.
pub fn router(gateway: Arc<Gateway>, backend: Router) -> Router {
    let metered = backend.layer(middleware::from_fn_with_state(
        Arc::clone(&gateway),
        authorize,
    ));

    Router::new()
        .route("/claims", get(pending_claims))
        .route("/claim/:id", get(claim))
        .with_state(gateway)
        .fallback_service(metered)
        .layer(TraceLayer::new_for_http())
}

async fn pending_claims(State(gateway): State<Arc<Gateway>>) -> Response {
    match gateway.claims().pending() {
        Ok(claims) => Json(claims).into_response(),
        Err(e) => {
            error!("Failed to list claims: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn claim(State(gateway): State<Arc<Gateway>>, Path(id): Path<u64>) -> Response {
    match gateway.claims().get(id) {
        Ok(claim) => Json::<Claim>(claim).into_response(),
        Err(e) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to fetch claim {}: {}", id, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builder for constructing a gateway.
pub struct GatewayBuilder {
    config: GatewayConfig,
}

impl GatewayBuilder {
    /// Create a new gateway builder with the given configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Build the stores and pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider key, upstream or seed is invalid, or
    /// the claim store cannot be opened.
    pub fn build(self) -> Result<RunningGateway> {
        info!("Building tollgate with config: {:?}", self.config);

        std::fs::create_dir_all(&self.config.root_dir)?;

        let provider = PubKey::from_hex(&self.config.provider_pubkey)
            .map_err(|e| Error::Config(format!("invalid provider_pubkey: {e}")))?;
        let upstream = Upstream::new(&self.config.upstream)?;

        let contracts = Arc::new(MemoryContractStore::new());
        let configs = Arc::new(MemoryConfigStore::new());
        if let Some(ref path) = self.config.seed_file {
            Seed::from_file(path)?.apply(&contracts, &configs)?;
            info!("Loaded {} contracts from {}", contracts.len(), path.display());
        }

        let claims: Arc<dyn ClaimStore> = match self.config.claim_store {
            ClaimStoreKind::Memory => Arc::new(MemoryClaimStore::new()),
            ClaimStoreKind::Disk => Arc::new(DiskClaimStore::open(&self.config.root_dir)?),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let stores = Stores {
            contracts: contracts.clone(),
            claims,
            configs,
        };
        let gateway = Gateway::new(provider, self.config.free_tier_rate_limit, stores)
            .with_limiter_capacity(self.config.rate_limiter_capacity)
            .with_events(events_tx.clone());

        Ok(RunningGateway {
            config: self.config,
            gateway: Arc::new(gateway),
            upstream: Arc::new(upstream),
            contracts,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A gateway ready to serve.
pub struct RunningGateway {
    config: GatewayConfig,
    gateway: Arc<Gateway>,
    upstream: Arc<Upstream>,
    contracts: Arc<MemoryContractStore>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: GatewayEventsSender,
    events_rx: Option<GatewayEventsChannel>,
}

impl RunningGateway {
    /// The access pipeline.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The contract cache, for the ledger feed to update.
    #[must_use]
    pub fn contracts(&self) -> &Arc<MemoryContractStore> {
        &self.contracts
    }

    /// Get a receiver for gateway events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<GatewayEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to gateway events.
    #[must_use]
    pub fn subscribe_events(&self) -> GatewayEventsChannel {
        self.events_tx.subscribe()
    }

    /// Bind the configured address and serve until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<()> {
        let address = listener.local_addr()?;
        info!("Starting tollgate on {}", address);

        let backend = Router::new()
            .fallback(proxy::forward)
            .with_state(Arc::clone(&self.upstream));
        let app = router(Arc::clone(&self.gateway), backend);

        let _ = self.events_tx.send(GatewayEvent::Started {
            address: address.to_string(),
        });

        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        let mut shutdown_rx = self.shutdown_rx.clone();
        let signal = async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Shutdown signal received");
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Ctrl-C received, initiating shutdown");
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                }
            }
        };

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        if let Err(ref e) = result {
            let _ = self.events_tx.send(GatewayEvent::Error {
                message: format!("Server failed: {e}"),
            });
        }
        let _ = self.events_tx.send(GatewayEvent::ShuttingDown);

        let stats = self.gateway.stats();
        info!(
            "Gateway shutdown complete ({} paid, {} free, {} denied, {:.1}% paid)",
            stats.paid,
            stats.free,
            stats.denied,
            stats.paid_rate()
        );
        result.map_err(|e| Error::Server(e.to_string()))
    }

    /// Request the gateway to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Handle that can request shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown_tx)
    }
}
