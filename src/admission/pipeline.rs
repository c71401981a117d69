//! Per-request admission pipeline.
//!
//! ```text
//! CLASSIFY → SECURITY_CHECK → RATE_LIMIT → AUTH_CHECK → FORWARD
//!     │            │               │             │
//!     └────────────┴───────────────┴─────────────┴──▶ REJECT(status)
//! ```
//!
//! `admit` holds the decision logic and never touches the network;
//! `admission_middleware` wraps it around the forwarding service.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::{AdmissionError, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use super::policy::{AdmissionPolicy, AdmissionState};
use crate::auth::{extract_token, Identity};
use crate::observability::metrics;
use crate::routing::{AdmissionMode, Classification, RouteClass};
use crate::security::{client_identity, RateDecision};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

/// Marks a 500 produced by catching a panic in the forwarding service.
#[derive(Debug, Clone)]
pub struct HandlerPanic {
    pub message: String,
}

/// Panic handler for the service behind the admission layer.
///
/// The middleware reads the [`HandlerPanic`] extension and logs it with the
/// request context it holds.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let mut response = AdmissionError::internal("panic").into_response();
    response.extensions_mut().insert(HandlerPanic {
        message: panic_message(payload.as_ref()),
    });
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A request the pipeline let through.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub classification: Classification,
    /// Set when the token check ran and passed.
    pub identity: Option<Identity>,
    /// Set when the request counted against a rate limit window.
    pub rate: Option<RateDecision>,
}

/// Run every admission stage for one request.
pub fn admit(
    policy: &AdmissionPolicy,
    headers: &HeaderMap,
    uri: &Uri,
    client: &str,
) -> Result<Admitted, AdmissionError> {
    let classification = policy.classifier.classify(uri.path());
    let class = classification.class;

    if classification.mode == AdmissionMode::Bypass {
        return Ok(Admitted {
            classification,
            identity: None,
            rate: None,
        });
    }

    if classification.mode == AdmissionMode::Full {
        if let Some(reason) = policy.detector.inspect(headers) {
            return Err(AdmissionError::Forbidden { reason });
        }
    }

    let rate = if class.is_api() {
        let decision = policy
            .limiter
            .check(class, client)
            .map_err(AdmissionError::internal)?;
        if let Some(d) = decision.filter(|d| !d.allowed) {
            return Err(AdmissionError::RateLimited {
                retry_after_secs: d.retry_after_secs,
                limit: d.limit,
            });
        }
        decision
    } else {
        None
    };

    if classification.mode == AdmissionMode::RateLimitOnly {
        return Ok(Admitted {
            classification,
            identity: None,
            rate,
        });
    }

    let identity = extract_token(headers, &policy.cookie_name)
        .and_then(|token| policy.codec.verify(&token).ok());
    match identity {
        Some(identity) => Ok(Admitted {
            classification,
            identity: Some(identity),
            rate,
        }),
        None => Err(AdmissionError::Unauthenticated {
            redirect: redirects(policy, class).then(|| sign_in_location(policy, uri)),
        }),
    }
}

fn redirects(policy: &AdmissionPolicy, class: RouteClass) -> bool {
    !class.is_api() || policy.redirect_api_requests
}

/// `sign_in_path?callbackUrl=<path>`, with the path form-encoded.
fn sign_in_location(policy: &AdmissionPolicy, uri: &Uri) -> String {
    let callback: String = url::form_urlencoded::byte_serialize(uri.path().as_bytes()).collect();
    format!("{}?callbackUrl={}", policy.sign_in_path, callback)
}

/// Remove identity headers a client may have forged.
pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in [X_USER_ID, X_USER_EMAIL, X_USER_ROLE] {
        headers.remove(name);
    }
}

/// Identity headers for the upstream request.
pub fn identity_headers(identity: &Identity) -> Result<HeaderMap, AdmissionError> {
    let mut headers = HeaderMap::new();
    headers.insert(X_USER_ID, header_value(&identity.subject_id)?);
    if let Some(email) = &identity.email {
        headers.insert(X_USER_EMAIL, header_value(email)?);
    }
    if let Some(role) = &identity.role {
        headers.insert(X_USER_ROLE, header_value(role)?);
    }
    Ok(headers)
}

fn header_value(raw: &str) -> Result<HeaderValue, AdmissionError> {
    HeaderValue::from_bytes(raw.as_bytes())
        .map_err(|e| AdmissionError::internal(format!("identity header: {e}")))
}

/// Axum middleware applying the admission pipeline.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let policy = state.policy();

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(request.headers(), peer, policy.trust_proxy_headers);

    strip_identity_headers(request.headers_mut());

    let decision = catch_unwind(AssertUnwindSafe(|| {
        admit(&policy, request.headers(), request.uri(), &client)
    }));
    let admitted = decision
        .unwrap_or_else(|payload| {
            Err(AdmissionError::internal(format!(
                "admission panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
        .and_then(|admitted| {
            let extra = match &admitted.identity {
                Some(identity) => identity_headers(identity)?,
                None => HeaderMap::new(),
            };
            Ok((admitted, extra))
        });

    let (admitted, extra) = match admitted {
        Ok(ok) => ok,
        Err(err) => return reject(err, &policy, &request, &client, started),
    };
    request.headers_mut().extend(extra.clone());

    let class = admitted.classification.class;
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let mut outcome = "forwarded";
    if let Some(panic) = response.extensions_mut().remove::<HandlerPanic>() {
        tracing::error!(
            %method,
            path = %path,
            client = %client,
            elapsed_ms = started.elapsed().as_millis() as u64,
            panic = %panic.message,
            "Request handler panicked"
        );
        outcome = "internal";
    }

    let headers = response.headers_mut();
    policy.headers.apply(headers);
    for name in [X_USER_ID, X_USER_EMAIL] {
        if let Some(value) = extra.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    if let Some(rate) = admitted.rate {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rate.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(rate.remaining));
    }
    headers.insert(X_RESPONSE_TIME, response_time(started));

    metrics::record_request(outcome, class.as_str(), started);
    response
}

fn reject(
    err: AdmissionError,
    policy: &AdmissionPolicy,
    request: &Request,
    client: &str,
    started: Instant,
) -> Response {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let method = request.method();
    let path = request.uri().path();

    match &err {
        AdmissionError::Internal { cause } => tracing::error!(
            %method, path, client, elapsed_ms, cause = %cause,
            "Admission failed"
        ),
        AdmissionError::Forbidden { reason } => tracing::warn!(
            %method, path, client, elapsed_ms, reason = reason.as_str(), detail = %reason,
            "Suspicious request blocked"
        ),
        AdmissionError::RateLimited { retry_after_secs, limit } => tracing::warn!(
            %method, path, client, elapsed_ms, retry_after_secs, limit,
            "Rate limit exceeded"
        ),
        AdmissionError::Unauthenticated { redirect } => tracing::debug!(
            %method, path, client, elapsed_ms, redirect = redirect.is_some(),
            "Unauthenticated request"
        ),
    }

    metrics::record_rejection(err.reason());
    let class = policy.classifier.classify(path).class;
    metrics::record_request(err.reason(), class.as_str(), started);
    err.into_response()
}

fn response_time(started: Instant) -> HeaderValue {
    let ms = started.elapsed().as_millis();
    // Digits and ASCII letters only.
    HeaderValue::from_str(&format!("{ms}ms")).unwrap_or_else(|_| HeaderValue::from_static("0ms"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::header::{AUTHORIZATION, COOKIE, USER_AGENT};

    use super::*;
    use crate::config::GateConfig;
    use crate::security::MemoryStore;

    const SECRET: &str = "pipeline-secret";

    fn policy() -> AdmissionPolicy {
        let mut config = GateConfig::default();
        config.auth.jwt_secret = SECRET.into();
        AdmissionPolicy::build(&config, Arc::new(MemoryStore::default())).unwrap()
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn with_cookie(policy: &AdmissionPolicy, subject: &str) -> HeaderMap {
        let token = policy.codec.issue(subject).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("authToken={token}")).unwrap());
        headers
    }

    #[test]
    fn test_bypass_skips_everything() {
        let policy = policy();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let admitted = admit(&policy, &headers, &uri("/pricing"), "1.1.1.1").unwrap();
        assert!(admitted.classification.is_bypass());
        assert!(admitted.identity.is_none());
        assert!(admitted.rate.is_none());
    }

    #[test]
    fn test_page_with_token() {
        let policy = policy();
        let headers = with_cookie(&policy, "user-1");
        let admitted = admit(&policy, &headers, &uri("/dashboard"), "1.1.1.1").unwrap();
        assert_eq!(admitted.identity.unwrap().subject_id, "user-1");
        assert!(admitted.rate.is_none());
    }

    #[test]
    fn test_page_without_token_redirects() {
        let err = admit(&policy(), &HeaderMap::new(), &uri("/dashboard/leads?x=1"), "ip").unwrap_err();
        match err {
            AdmissionError::Unauthenticated { redirect: Some(location) } => {
                assert_eq!(location, "/signin?callbackUrl=%2Fdashboard%2Fleads");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_api_without_token_is_401() {
        let err = admit(&policy(), &HeaderMap::new(), &uri("/api/leads"), "ip").unwrap_err();
        assert!(matches!(err, AdmissionError::Unauthenticated { redirect: None }));
    }

    #[test]
    fn test_api_redirect_when_configured() {
        let mut config = GateConfig::default();
        config.auth.jwt_secret = SECRET.into();
        config.auth.redirect_api_requests = true;
        let policy = AdmissionPolicy::build(&config, Arc::new(MemoryStore::default())).unwrap();
        let err = admit(&policy, &HeaderMap::new(), &uri("/api/leads"), "ip").unwrap_err();
        assert!(matches!(err, AdmissionError::Unauthenticated { redirect: Some(_) }));
    }

    #[test]
    fn test_suspicious_beats_valid_token() {
        let policy = policy();
        let mut headers = with_cookie(&policy, "user-1");
        headers.insert(USER_AGENT, HeaderValue::from_static("python-requests/2.31"));
        let err = admit(&policy, &headers, &uri("/api/leads"), "ip").unwrap_err();
        assert!(matches!(err, AdmissionError::Forbidden { .. }));
        // Rejected before the limiter counted it.
        assert_eq!(policy.limiter.store().window_count(), 0);
    }

    #[test]
    fn test_auth_api_is_rate_limited_only() {
        let policy = policy();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        for _ in 0..5 {
            let admitted = admit(&policy, &headers, &uri("/api/auth/signin"), "ip").unwrap();
            assert!(admitted.identity.is_none());
        }
        let err = admit(&policy, &headers, &uri("/api/auth/signin"), "ip").unwrap_err();
        assert!(matches!(err, AdmissionError::RateLimited { limit: 5, .. }));
    }

    #[test]
    fn test_rate_limit_counts_before_auth() {
        let policy = policy();
        for _ in 0..100 {
            let _ = admit(&policy, &HeaderMap::new(), &uri("/api/leads"), "ip");
        }
        let err = admit(&policy, &HeaderMap::new(), &uri("/api/leads"), "ip").unwrap_err();
        match err {
            AdmissionError::RateLimited { retry_after_secs, limit } => {
                assert_eq!(limit, 100);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bearer_fallback_and_rate_decision() {
        let policy = policy();
        let token = policy.codec.issue("user-2").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        let admitted = admit(&policy, &headers, &uri("/api/ai/score"), "ip").unwrap();
        assert_eq!(admitted.identity.unwrap().subject_id, "user-2");
        let rate = admitted.rate.unwrap();
        assert_eq!((rate.limit, rate.remaining), (10, 9));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let policy = policy();
        let token = policy.codec.issue("user-1").unwrap();
        let tampered = format!("{}x", token);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("authToken={tampered}")).unwrap());
        assert!(admit(&policy, &headers, &uri("/api/leads"), "ip").is_err());
    }

    #[test]
    fn test_identity_headers() {
        let identity = Identity::new("user-ü").with_email("a@b.co");
        let headers = identity_headers(&identity).unwrap();
        assert_eq!(headers[X_USER_ID].as_bytes(), "user-ü".as_bytes());
        assert_eq!(headers[X_USER_EMAIL], "a@b.co");
        assert!(headers.get(X_USER_ROLE).is_none());
    }

    #[test]
    fn test_strip_identity_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(X_USER_ID, HeaderValue::from_static("admin"));
        headers.insert(X_USER_ROLE, HeaderValue::from_static("owner"));
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        strip_identity_headers(&mut headers);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_panic_response_is_generic_and_marked() {
        let response = panic_response(Box::new(String::from("index out of bounds")));
        assert_eq!(response.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let marker = response.extensions().get::<HandlerPanic>().unwrap();
        assert_eq!(marker.message, "index out of bounds");

        let response = panic_response(Box::new(42_u8));
        assert_eq!(
            response.extensions().get::<HandlerPanic>().unwrap().message,
            "unknown panic payload"
        );
    }
}
