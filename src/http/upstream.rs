//! Forwarding admitted requests to the upstream application.
//!
//! # Responsibilities
//! - Rewrite the request URI against the configured upstream
//! - Strip hop-by-hop headers, set `X-Forwarded-*`
//! - Bound every call with a timeout
//!
//! # Design Decisions
//! - No retries: non-idempotent requests pass through, and `Retry-After`
//!   from the limiter is the client's retry signal
//! - Bodies are streamed, never buffered

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName},
        uri::{Authority, PathAndQuery, Scheme},
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::admission::ErrorBody;
use crate::config::UpstreamConfig;
use crate::observability::metrics;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url '{0}'")]
    InvalidUrl(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("could not build upstream request: {0}")]
    Build(#[from] axum::http::Error),
}

impl UpstreamError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) | Self::Build(_) => "invalid",
            Self::Timeout(_) => "timeout",
            Self::Request(_) => "connect",
        }
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        match self {
            Self::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ErrorBody { error: "Upstream timed out" }),
            )
                .into_response(),
            _ => (StatusCode::BAD_GATEWAY, Json(ErrorBody { error: "Bad gateway" }))
                .into_response(),
        }
    }
}

/// HTTP client bound to one upstream origin.
#[derive(Clone)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    scheme: Scheme,
    authority: Authority,
    timeout: Duration,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Upstream {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let uri = Uri::from_str(&config.url).map_err(|_| UpstreamError::InvalidUrl(config.url.clone()))?;
        let (Some(scheme), Some(authority)) = (uri.scheme().cloned(), uri.authority().cloned()) else {
            return Err(UpstreamError::InvalidUrl(config.url.clone()));
        };
        if scheme != Scheme::HTTP {
            return Err(UpstreamError::InvalidUrl(config.url.clone()));
        }

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            scheme,
            authority,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Send `request` upstream, keeping its path and query.
    pub async fn forward(
        &self,
        request: Request<Body>,
        peer: Option<SocketAddr>,
    ) -> Result<Response, UpstreamError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let uri = Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;

        let original_host = parts.headers.get(header::HOST).cloned();
        prepare_headers(&mut parts.headers, peer, original_host);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }

        parts.uri = uri;
        let outbound = Request::from_parts(parts, body);

        let response = match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(result) => result?,
            Err(_) => return Err(UpstreamError::Timeout(self.timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn prepare_headers(headers: &mut HeaderMap, peer: Option<SocketAddr>, host: Option<HeaderValue>) {
    strip_hop_by_hop(headers);

    if let Some(peer) = peer {
        let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {}", peer.ip()),
            None => peer.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if let Some(host) = host {
        headers.entry(X_FORWARDED_HOST).or_insert(host);
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped as well.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_str(name.trim()).ok())
        .collect();
    for name in named.into_iter().chain(HOP_BY_HOP) {
        headers.remove(name);
    }
}

/// Turn an upstream failure into the client response, logging it.
pub fn failure_response(err: UpstreamError, method: &str, path: &str) -> Response {
    metrics::record_upstream_error(err.kind());
    tracing::error!(method, path, error = %err, "Upstream request failed");
    err.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_upstream_url() {
        let config = UpstreamConfig {
            url: "not a url".into(),
            ..UpstreamConfig::default()
        };
        assert!(matches!(Upstream::from_config(&config), Err(UpstreamError::InvalidUrl(_))));

        let config = UpstreamConfig {
            url: "/relative".into(),
            ..UpstreamConfig::default()
        };
        assert!(Upstream::from_config(&config).is_err());
    }

    #[test]
    fn test_prepare_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        prepare_headers(&mut headers, Some(peer), Some(HeaderValue::from_static("app.example")));

        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-secret").is_none());
        assert!(headers.get("keep-alive").is_none());
        assert_eq!(headers[X_FORWARDED_FOR], "203.0.113.9, 10.0.0.1");
        assert_eq!(headers[X_FORWARDED_PROTO], "http");
        assert_eq!(headers[X_FORWARDED_HOST], "app.example");
        assert_eq!(headers[header::ACCEPT], "text/html");
    }

    #[test]
    fn test_error_statuses() {
        let timeout = UpstreamError::Timeout(Duration::from_secs(30)).into_response();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        let invalid = UpstreamError::InvalidUrl("x".into()).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_GATEWAY);
    }
}
