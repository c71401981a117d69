//! Security response headers.
//!
//! # Responsibilities
//! - Build the Content-Security-Policy from configured origin allow-lists
//! - Compile the full header bundle once per configuration
//! - Stamp the bundle onto forwarded responses
//!
//! # Design Decisions
//! - Header values are validated when the bundle is built, never per request
//! - Bundle overwrites whatever the upstream set for the same names

use axum::http::{
    header::{
        CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
        X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    },
    HeaderMap, HeaderName, HeaderValue,
};

use crate::config::SecurityConfig;

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

/// Names every forwarded response carries when headers are enabled.
pub const BUNDLE: [HeaderName; 6] = [
    CONTENT_SECURITY_POLICY,
    X_FRAME_OPTIONS,
    X_CONTENT_TYPE_OPTIONS,
    REFERRER_POLICY,
    PERMISSIONS_POLICY,
    STRICT_TRANSPORT_SECURITY,
];

/// A configured header value was not a legal header value.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for security header {name}")]
pub struct InvalidHeader {
    pub name: &'static str,
}

/// Precompiled security header bundle.
#[derive(Debug, Clone, Default)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, InvalidHeader> {
        let mut headers = HeaderMap::new();
        if !config.enable_headers {
            return Ok(Self { headers });
        }

        let value = |name: &'static str, raw: String| {
            HeaderValue::from_str(&raw).map_err(|_| InvalidHeader { name })
        };

        headers.insert(
            CONTENT_SECURITY_POLICY,
            value("content-security-policy", content_security_policy(config))?,
        );
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(
            REFERRER_POLICY,
            value("referrer-policy", config.referrer_policy.clone())?,
        );
        headers.insert(
            PERMISSIONS_POLICY,
            value("permissions-policy", config.permissions_policy.clone())?,
        );
        headers.insert(
            STRICT_TRANSPORT_SECURITY,
            value(
                "strict-transport-security",
                format!("max-age={}; includeSubDomains", config.hsts_max_age_secs),
            )?,
        );

        Ok(Self { headers })
    }

    /// Insert every header of the bundle, replacing existing values.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in self.headers.iter() {
            target.insert(name.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn content_security_policy(config: &SecurityConfig) -> String {
    let with = |base: &str, extra: &[String]| {
        let mut directive = base.to_string();
        for origin in extra {
            directive.push(' ');
            directive.push_str(origin);
        }
        directive
    };

    [
        "default-src 'self'".to_string(),
        with("script-src 'self' 'unsafe-inline'", &config.script_origins),
        "style-src 'self' 'unsafe-inline' https://fonts.googleapis.com".to_string(),
        with("font-src 'self' data:", &config.font_origins),
        "img-src 'self' data: blob: https:".to_string(),
        with("connect-src 'self'", &config.connect_origins),
        with("frame-src 'self'", &config.frame_origins),
        "frame-ancestors 'none'".to_string(),
        "object-src 'none'".to_string(),
        "base-uri 'self'".to_string(),
        "form-action 'self'".to_string(),
    ]
    .join("; ")
}
