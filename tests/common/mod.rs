//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use http_body_util::BodyExt;
use leadnest_gate::auth::{Identity, TokenCodec};
use leadnest_gate::config::GateConfig;
use leadnest_gate::http::gate_router;
use leadnest_gate::security::{MemoryStore, RateLimitStore};
use leadnest_gate::AdmissionState;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-test-secret";

/// Default configuration with a known signing secret.
pub fn test_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.auth.jwt_secret = SECRET.into();
    config
}

pub fn codec() -> TokenCodec {
    TokenCodec::new(SECRET, 7 * 24 * 60 * 60)
}

pub fn token_for(subject: &str) -> String {
    codec().issue_for(&Identity::new(subject).with_email(format!("{subject}@leadnest.test"))).unwrap()
}

/// Echo the identity headers the upstream received, as JSON.
async fn echo(headers: HeaderMap) -> Response {
    let seen: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-user-") || name.as_str() == "x-request-id")
        .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
        .collect();
    // An upstream trying to loosen framing; the gateway must overwrite it.
    ([("x-frame-options", "SAMEORIGIN")], Json(seen)).into_response()
}

/// In-process downstream application wrapped by the full gateway stack.
pub fn gateway(config: &GateConfig) -> Router {
    let state = AdmissionState::new(config, Arc::new(MemoryStore::default())).unwrap();
    gate_router(Router::new().fallback(echo), state, config)
}

/// The gateway stack over a caller-supplied downstream and counter store.
pub fn gateway_over(config: &GateConfig, store: Arc<dyn RateLimitStore>, inner: Router) -> Router {
    let state = AdmissionState::new(config, store).unwrap();
    gate_router(inner, state, config)
}

pub fn get(path: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path)
}

pub fn empty(builder: axum::http::request::Builder) -> Request<Body> {
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
}

/// Start an axum backend echoing identity headers.
pub async fn start_echo_backend(addr: SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, Router::new().fallback(echo)).await;
    });
}

/// Start a backend that waits before answering.
pub async fn start_slow_backend<F, Fut>(addr: SocketAddr, delay: Duration, f: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (StatusCode, String)> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let f = Arc::new(f);
    let app = Router::new().fallback(move || {
        let f = f.clone();
        async move {
            tokio::time::sleep(delay).await;
            f().await
        }
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}
