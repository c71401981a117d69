//! Client identity for rate limiting.

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Identity used when nothing better is known.
pub const ANONYMOUS: &str = "anonymous";

/// Derive the rate-limit identity of a client.
///
/// With `trust_proxy_headers`, the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise (or when both are absent) the TCP peer is used, and
/// `anonymous` when even that is unknown.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}
