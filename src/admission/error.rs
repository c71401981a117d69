//! Admission rejections.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::security::Suspicion;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Every way the pipeline can refuse to forward a request.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Suspicious user agent or referer.
    #[error("access denied: {reason}")]
    Forbidden { reason: Suspicion },

    /// Fixed window exhausted.
    #[error("rate limit of {limit} exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, limit: u32 },

    /// Missing, malformed, tampered or expired token.
    /// `redirect` is set for requests answered with a sign-in redirect.
    #[error("authentication required")]
    Unauthenticated { redirect: Option<String> },

    /// Anything that is our fault. `cause` is logged, never sent.
    #[error("internal error: {cause}")]
    Internal { cause: String },
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
}

impl AdmissionError {
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal {
            cause: cause.to_string(),
        }
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Forbidden { .. } => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthenticated { redirect: Some(_) } => StatusCode::TEMPORARY_REDIRECT,
            Self::Unauthenticated { redirect: None } => StatusCode::UNAUTHORIZED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Forbidden { .. } => {
                (status, Json(ErrorBody { error: "Access denied" })).into_response()
            }
            Self::RateLimited { retry_after_secs, limit } => {
                let mut response = (
                    status,
                    Json(ErrorBody {
                        error: "Too many requests, please try again later.",
                    }),
                )
                    .into_response();
                let headers = response.headers_mut();
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));
                response
            }
            Self::Unauthenticated { redirect: Some(location) } => {
                Redirect::temporary(&location).into_response()
            }
            Self::Unauthenticated { redirect: None } => {
                (status, Json(ErrorBody { error: "Unauthorized" })).into_response()
            }
            Self::Internal { .. } => {
                (status, Json(ErrorBody { error: "Internal server error" })).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn test_rate_limited_headers() {
        let response = AdmissionError::RateLimited { retry_after_secs: 42, limit: 100 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "42");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "100");
    }

    #[test]
    fn test_redirect() {
        let response = AdmissionError::Unauthenticated {
            redirect: Some("/signin?callbackUrl=%2Fdashboard".into()),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/signin?callbackUrl=%2Fdashboard");
    }

    #[test]
    fn test_statuses() {
        assert_eq!(
            AdmissionError::Forbidden { reason: Suspicion::UserAgent("curl".into()) }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AdmissionError::Unauthenticated { redirect: None }.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AdmissionError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
