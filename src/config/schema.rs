//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the admission gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Downstream application that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Credential token and sign-in settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Security headers and suspicious-request heuristics.
    pub security: SecurityConfig,

    /// Route exclusion lists.
    pub routes: RoutesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Total time allowed for a request/response exchange, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            request_timeout_secs: 60,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the web application (scheme + authority).
    pub url: String,

    /// Deadline for a single upstream exchange, in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

/// Credential token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify tokens.
    /// Overridden by the `JWT_SECRET` environment variable.
    pub jwt_secret: String,

    /// Token lifetime in seconds (7 days by default).
    pub token_ttl_secs: i64,

    /// Name of the cookie carrying the token.
    pub cookie_name: String,

    /// Page unauthenticated page requests are redirected to.
    pub sign_in_path: String,

    /// Redirect unauthenticated `/api/*` calls to the sign-in page instead of
    /// answering 401.
    pub redirect_api_requests: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            cookie_name: "authToken".to_string(),
            sign_in_path: "/signin".to_string(),
            redirect_api_requests: false,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Derive client identity from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,

    /// Minimum interval between sweeps of expired windows, in seconds.
    pub sweep_interval_secs: u64,

    /// Authentication endpoints (`/api/auth/*`).
    pub auth: LimitConfig,

    /// Default for `/api/*`.
    pub api: LimitConfig,

    /// AI generation endpoints (`/api/ai/*`).
    pub ai: LimitConfig,

    /// Upload endpoints (`/api/upload*`).
    pub upload: LimitConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_proxy_headers: true,
            sweep_interval_secs: 60,
            auth: LimitConfig { window_secs: 15 * 60, max_requests: 5 },
            api: LimitConfig { window_secs: 60, max_requests: 100 },
            ai: LimitConfig { window_secs: 60, max_requests: 10 },
            upload: LimitConfig { window_secs: 60, max_requests: 5 },
        }
    }
}

/// A single fixed-window limit.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests admitted per window.
    pub max_requests: u32,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Attach the security header bundle to forwarded responses.
    pub enable_headers: bool,

    /// Case-insensitive regex fragments matched against `User-Agent`.
    pub suspicious_user_agents: Vec<String>,

    /// Referer hosts that are rejected (subdomains included).
    pub blocked_referer_hosts: Vec<String>,

    /// Extra `script-src` origins (payments).
    pub script_origins: Vec<String>,

    /// Extra `font-src` origins.
    pub font_origins: Vec<String>,

    /// Extra `frame-src` origins (payment iframes).
    pub frame_origins: Vec<String>,

    /// Extra `connect-src` origins.
    pub connect_origins: Vec<String>,

    /// `Strict-Transport-Security` max-age in seconds.
    pub hsts_max_age_secs: u64,

    /// `Referrer-Policy` value.
    pub referrer_policy: String,

    /// `Permissions-Policy` value.
    pub permissions_policy: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            suspicious_user_agents: [
                "bot",
                "crawler",
                "spider",
                "scraper",
                "curl",
                "wget",
                "python-requests",
                "python-urllib",
                "go-http-client",
                "libwww-perl",
                "scrapy",
                "httpclient",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            blocked_referer_hosts: Vec::new(),
            script_origins: vec!["https://js.stripe.com".to_string()],
            font_origins: vec!["https://fonts.gstatic.com".to_string()],
            frame_origins: vec!["https://js.stripe.com".to_string()],
            connect_origins: vec!["https://api.stripe.com".to_string()],
            hsts_max_age_secs: 31_536_000,
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=()".to_string(),
        }
    }
}

/// Paths that bypass admission entirely.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Exact public paths (marketing pages).
    pub public_paths: Vec<String>,

    /// Public path prefixes; a prefix matches itself and anything below it.
    pub public_prefixes: Vec<String>,

    /// Sign-in/up pages reachable without a token.
    pub auth_pages: Vec<String>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            public_paths: owned(&[
                "/",
                "/features",
                "/pricing",
                "/contact",
                "/team",
                "/faq",
                "/documentation",
                "/privacy-policy",
                "/terms",
            ]),
            public_prefixes: owned(&[
                "/_next/",
                "/static/",
                "/images/",
                "/fonts/",
                "/blog",
                "/api/health",
                "/api/docs",
            ]),
            auth_pages: owned(&["/signin", "/signup", "/forgot-password", "/reset-password"]),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
