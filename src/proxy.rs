//! Reverse proxy to the metered backend.
//!
//! Requests that pass the access pipeline are replayed against the upstream
//! base URL with the proof parameters removed from the query.

use crate::error::{Error, Result};
use crate::proof::{QUERY_DELEGATED, QUERY_DIRECT};
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::header::{CONNECTION, HOST, TRANSFER_ENCODING};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Largest request body forwarded upstream.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Upstream backend.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
}

impl Upstream {
    /// Create a proxy to `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an absolute URL or the HTTP client
    /// cannot be built.
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| Error::Config(format!("invalid upstream {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!("upstream {base} cannot be a base URL")));
        }

        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| Error::Server(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base })
    }

    /// Upstream base URL.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL a request for `path?query` is sent to.
    #[must_use]
    pub fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("{}{}", self.base.path().trim_end_matches('/'), path));

        let pairs: Vec<(String, String)> = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .filter(|(key, _)| key != QUERY_DELEGATED && key != QUERY_DIRECT)
                    .collect()
            })
            .unwrap_or_default();

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        url
    }

    async fn send(&self, req: Request<Body>) -> std::result::Result<Response, String> {
        let (parts, body) = req.into_parts();
        let target = self.target(parts.uri.path(), parts.uri.query());
        let body = to_bytes(body, MAX_BODY_SIZE)
            .await
            .map_err(|e| format!("failed to read request body: {e}"))?;

        let mut headers = parts.headers;
        headers.remove(HOST);
        headers.remove(CONNECTION);

        debug!("Forwarding {} {}", parts.method, target);
        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| format!("upstream request failed: {e}"))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        headers.remove(TRANSFER_ENCODING);
        headers.remove(CONNECTION);
        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| format!("failed to read upstream body: {e}"))?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Fallback handler forwarding everything to the upstream.
pub async fn forward(State(upstream): State<Arc<Upstream>>, req: Request<Body>) -> Response {
    match upstream.send(req).await {
        Ok(response) => response,
        Err(e) => {
            warn!("{}", e);
            (StatusCode::BAD_GATEWAY, StatusCode::BAD_GATEWAY.to_string()).into_response()
        }
    }
}
