//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows and TTL within bounds, limits > 0, timeouts > 0)
//! - Check that patterns compile and URLs/addresses parse
//! - Check that the sign-in page is reachable without a token
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GateConfig, LimitConfig};
use crate::routing::RouteClassifier;

/// Longest accepted rate limit window: one day.
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("auth.jwt_secret must not be empty (set it in the file or via JWT_SECRET)")]
    MissingSecret,

    #[error("auth.token_ttl_secs must be positive")]
    NonPositiveTtl,

    #[error("auth.token_ttl_secs must not exceed {max}")]
    TtlTooLong { max: i64 },

    #[error("auth.cookie_name must not be empty")]
    EmptyCookieName,

    #[error("auth.sign_in_path '{0}' must start with '/' and be listed in routes.auth_pages")]
    SignInPathNotPublic(String),

    #[error("rate_limit.{class}: window_secs and max_requests must be greater than zero")]
    ZeroLimit { class: &'static str },

    #[error("rate_limit.{class}.window_secs must not exceed {max}")]
    WindowTooLong { class: &'static str, max: u64 },

    #[error("security.suspicious_user_agents: invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("upstream.url '{0}' is not an absolute http URL")]
    InvalidUpstream(String),

    #[error("upstream.timeout_secs and upstream.connect_timeout_secs must be greater than zero")]
    ZeroUpstreamTimeout,

    #[error("{field} '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.trim().is_empty() {
        errors.push(ValidationError::MissingSecret);
    }
    if config.auth.token_ttl_secs <= 0 {
        errors.push(ValidationError::NonPositiveTtl);
    } else if config.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
        errors.push(ValidationError::TtlTooLong { max: MAX_TOKEN_TTL_SECS });
    }
    if config.auth.cookie_name.trim().is_empty() {
        errors.push(ValidationError::EmptyCookieName);
    }

    let sign_in = &config.auth.sign_in_path;
    let classifier = RouteClassifier::from_config(&config.routes);
    if !sign_in.starts_with('/') || !classifier.classify(sign_in).is_bypass() {
        errors.push(ValidationError::SignInPathNotPublic(sign_in.clone()));
    }

    let limits: [(&'static str, &LimitConfig); 4] = [
        ("auth", &config.rate_limit.auth),
        ("api", &config.rate_limit.api),
        ("ai", &config.rate_limit.ai),
        ("upload", &config.rate_limit.upload),
    ];
    for (class, limit) in limits {
        if limit.window_secs == 0 || limit.max_requests == 0 {
            errors.push(ValidationError::ZeroLimit { class });
        } else if limit.window_secs > MAX_WINDOW_SECS {
            errors.push(ValidationError::WindowTooLong { class, max: MAX_WINDOW_SECS });
        }
    }

    for pattern in &config.security.suspicious_user_agents {
        if let Err(e) = regex::Regex::new(pattern) {
            errors.push(ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    match url::Url::parse(&config.upstream.url) {
        // The upstream is reached over plain HTTP on the private network.
        Ok(u) if u.scheme() == "http" && u.host_str().is_some() => {}
        _ => errors.push(ValidationError::InvalidUpstream(config.upstream.url.clone())),
    }
    if config.upstream.timeout_secs == 0 || config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroUpstreamTimeout);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
