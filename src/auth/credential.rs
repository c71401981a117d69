//! Credential extraction from request headers.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

/// Pull the raw token out of the request.
///
/// The named cookie wins; an `Authorization: Bearer` header is the fallback.
/// Blank values count as absent.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        let value = cookie.value().trim();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| {
            let (scheme, token) = h.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;

    #[test]
    fn test_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "theme=dark; authToken=abc.def.ghi".parse().unwrap());
        assert_eq!(extract_token(&headers, "authToken").as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_cookie_preferred_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "authToken=from-cookie".parse().unwrap());
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers, "authToken").as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "bearer   xyz ".parse().unwrap());
        assert_eq!(extract_token(&headers, "authToken").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_legacy_cookie_name_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, "auth-token=abc".parse().unwrap());
        assert_eq!(extract_token(&headers, "authToken"), None);
    }

    #[test]
    fn test_absent_or_blank() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers, "authToken"), None);

        headers.insert(COOKIE, "authToken=".parse().unwrap());
        headers.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_token(&headers, "authToken"), None);
    }
}
