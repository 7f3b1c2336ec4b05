use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which of the two token flavours a claim belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "refresh_token")]
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Identity claim carried inside a signed token.
///
/// Wire shape is `{sub, token_type, iat, exp}` with seconds-resolution UTC
/// timestamps. Claims are never mutated; a refresh derives a fresh access claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaim {
    /// Username the token was issued to.
    #[serde(default)]
    pub sub: String,

    pub token_type: TokenKind,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiry (unix seconds).
    pub exp: i64,
}

impl IdentityClaim {
    pub fn new(subject: impl Into<String>, kind: TokenKind, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub: subject.into(),
            token_type: kind,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(&'static str),
}

/// Check a decoded claim against the clock and the expected kind.
///
/// Expiry is judged first, so an expired token of the wrong kind still
/// reports `Expired`.
pub fn validate_claims(claim: &IdentityClaim, expected: TokenKind, now: DateTime<Utc>) -> Result<(), TokenError> {
    if now.timestamp() >= claim.exp {
        return Err(TokenError::Expired);
    }
    if claim.token_type != expected {
        return Err(TokenError::Invalid("unexpected token type"));
    }
    if claim.sub.trim().is_empty() {
        return Err(TokenError::Invalid("missing subject"));
    }
    Ok(())
}
