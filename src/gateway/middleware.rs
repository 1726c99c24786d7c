//! HTTP binding of the access pipeline.

use super::decision::{AccessDecision, Outcome};
use super::pipeline::{AccessRequest, Gateway};
use crate::contract::Cors;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Response header naming the tier a request was evaluated at.
pub const TIER_HEADER: &str = "tier";

const REAL_IP: &str = "x-real-ip";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Caller address: `X-Real-Ip`, then the first `X-Forwarded-For` entry, then the peer IP.
#[must_use]
pub fn remote_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(ip) = header(REAL_IP) {
        return ip.to_string();
    }
    if let Some(ip) = header(FORWARDED_FOR)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Authorize a request before it reaches the metered backend.
pub async fn authorize(
    State(gateway): State<Arc<Gateway>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let remote = remote_addr(req.headers(), peer);

    let decision = gateway.authorize(&AccessRequest {
        query: req.uri().query(),
        path: req.uri().path(),
        remote_addr: &remote,
    });

    let AccessDecision {
        cors,
        tier,
        outcome,
    } = decision;

    let mut response = match outcome {
        Outcome::Forward => next.run(req).await,
        Outcome::Deny(denial) => (denial.status(), denial.body()).into_response(),
    };

    let headers = response.headers_mut();
    if let Some(tier) = tier {
        headers.insert(
            HeaderName::from_static(TIER_HEADER),
            HeaderValue::from_static(tier.as_str()),
        );
    }
    if let Some(cors) = cors {
        apply_cors(headers, &cors);
    }

    response
}

fn apply_cors(headers: &mut HeaderMap, cors: &Cors) {
    for (name, values) in [
        (ACCESS_CONTROL_ALLOW_ORIGIN, &cors.allow_origins),
        (ACCESS_CONTROL_ALLOW_METHODS, &cors.allow_methods),
        (ACCESS_CONTROL_ALLOW_HEADERS, &cors.allow_headers),
    ] {
        if values.is_empty() {
            continue;
        }
        match HeaderValue::from_str(&values.join(", ")) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(e) => warn!("Skipping unencodable {} value: {}", name, e),
        }
    }
}
