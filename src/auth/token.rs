//! Credential token issuing and verification.
//!
//! Tokens are HS256 JWTs signed with a server-held secret. A token is valid
//! iff its signature verifies AND the current time is strictly before `exp`.
//! Every failure collapses into the single [`InvalidToken`] outcome; the
//! underlying reason is only logged.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default token lifetime: 7 days.
pub const DEFAULT_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// JWT claims carried by a credential token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user id).
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Token id, for log correlation only.
    pub jti: String,
}

/// The identity a valid token proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: None,
            role: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Token could not be verified. Deliberately carries no reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid or expired token")]
pub struct InvalidToken;

/// Token could not be issued.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("subject id must not be empty")]
    EmptySubject,
    #[error("token lifetime of {0}s overflows the expiry timestamp")]
    TtlOutOfRange(i64),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Signs and verifies credential tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec for `secret` issuing tokens valid for `ttl_secs`.
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a token for a bare subject id.
    pub fn issue(&self, subject_id: &str) -> Result<String, IssueError> {
        self.issue_at(&Identity::new(subject_id), Utc::now())
    }

    /// Issue a token carrying email and role as well.
    pub fn issue_for(&self, identity: &Identity) -> Result<String, IssueError> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, IssueError> {
        if identity.subject_id.is_empty() {
            return Err(IssueError::EmptySubject);
        }

        let expires_at = Duration::try_seconds(self.ttl_secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(IssueError::TtlOutOfRange(self.ttl_secs))?;

        let claims = Claims {
            sub: identity.subject_id.clone(),
            email: identity.email.clone(),
            role: identity.role.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Identity, InvalidToken> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, InvalidToken> {
        self.decode_claims(token, now).map(Identity::from)
    }

    fn decode_claims(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, InvalidToken> {
        // Expiry is checked below against `now` so callers can supply the clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            InvalidToken
        })?;

        if now.timestamp() >= data.claims.exp {
            tracing::debug!(jti = %data.claims.jti, "Token expired");
            return Err(InvalidToken);
        }
        if data.claims.sub.is_empty() {
            return Err(InvalidToken);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "unit-test-secret";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, DEFAULT_TTL_SECS)
    }

    fn issued_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_subject() {
        let codec = codec();
        for subject in ["65f1c0ffee", "user-1", "a@b.c", "ünïcødé"] {
            let token = codec.issue(subject).unwrap();
            let identity = codec.verify(&token).unwrap();
            assert_eq!(identity.subject_id, subject);
            assert_eq!(identity.email, None);
            assert_eq!(identity.role, None);
        }
    }

    #[test]
    fn test_round_trip_carries_email_and_role() {
        let codec = codec();
        let identity = Identity::new("42").with_email("ana@leadnest.io").with_role("admin");
        let token = codec.issue_for(&identity).unwrap();
        assert_eq!(codec.verify(&token).unwrap(), identity);
    }

    #[test]
    fn test_valid_until_exactly_seven_days() {
        let codec = codec();
        let start = issued_at();
        let token = codec.issue_at(&Identity::new("u1"), start).unwrap();

        let last_valid = start + Duration::seconds(DEFAULT_TTL_SECS - 1);
        let expiry = start + Duration::seconds(DEFAULT_TTL_SECS);

        assert!(codec.verify_at(&token, start).is_ok());
        assert!(codec.verify_at(&token, last_valid).is_ok());
        assert_eq!(codec.verify_at(&token, expiry), Err(InvalidToken));
        assert_eq!(
            codec.verify_at(&token, expiry + Duration::days(30)),
            Err(InvalidToken)
        );
    }

    #[test]
    fn test_flipping_any_signature_char_invalidates() {
        let codec = codec();
        let start = issued_at();
        let token = codec.issue_at(&Identity::new("u1"), start).unwrap();
        let split = token.rfind('.').unwrap() + 1;

        for i in split..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                codec.verify_at(&tampered, start),
                Err(InvalidToken),
                "position {i} accepted"
            );
        }
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = codec().issue("u1").unwrap();
        let other = TokenCodec::new("another-secret", DEFAULT_TTL_SECS);
        assert_eq!(other.verify(&token), Err(InvalidToken));
    }

    #[test]
    fn test_malformed_tokens_fail() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c", "...", "Bearer x.y.z"] {
            assert_eq!(codec.verify(token), Err(InvalidToken), "{token:?} accepted");
        }
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let claims = Claims {
            sub: "u1".into(),
            email: None,
            role: None,
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 60,
            jti: "x".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(codec().verify(&token), Err(InvalidToken));
    }

    #[test]
    fn test_empty_subject_not_issued() {
        assert!(matches!(codec().issue(""), Err(IssueError::EmptySubject)));
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        let codec = TokenCodec::new(SECRET, i64::MAX);
        assert!(matches!(
            codec.issue_at(&Identity::new("u1"), issued_at()),
            Err(IssueError::TtlOutOfRange(i64::MAX))
        ));
    }
}
