//! Token Service: mints and verifies HS256 identity tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use thiserror::Error;

use crate::claims::{validate_claims, IdentityClaim, TokenError, TokenKind};

/// Secret and lifetimes for the Token Service.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>, access_ttl_minutes: i64, refresh_ttl_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::minutes(refresh_ttl_minutes),
        }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

impl core::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

#[derive(Debug, Error)]
#[error("failed to sign token: {0}")]
pub struct TokenIssueError(#[from] jsonwebtoken::errors::Error);

/// Access + refresh tokens returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

/// Stateless issuer/validator. Cheap to clone behind an `Arc`.
pub struct TokenService {
    config: TokenConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());

        // Expiry is checked against the caller's clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        Self { config, encoding, decoding, validation }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<String, TokenIssueError> {
        self.issue_at(subject, kind, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<String, TokenIssueError> {
        let claim = IdentityClaim::new(subject, kind, now, self.config.ttl(kind));
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claim, &self.encoding)?)
    }

    pub fn issue_pair(&self, subject: &str) -> Result<TokenPair, TokenIssueError> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.issue_at(subject, TokenKind::Access, now)?,
            refresh_token: self.issue_at(subject, TokenKind::Refresh, now)?,
            token_type: "bearer",
        })
    }

    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<IdentityClaim, TokenError> {
        self.validate_at(token, expected, Utc::now())
    }

    /// Verify signature, then expiry, then kind and subject.
    pub fn validate_at(&self, token: &str, expected: TokenKind, now: DateTime<Utc>) -> Result<IdentityClaim, TokenError> {
        let data = jsonwebtoken::decode::<IdentityClaim>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected during decode");
                TokenError::Invalid("signature or format")
            })?;

        validate_claims(&data.claims, expected, now)?;
        Ok(data.claims)
    }

    /// Mint a new access token from a valid refresh token.
    ///
    /// The presented refresh token is not rotated and stays usable until it expires.
    pub fn refresh(&self, refresh_token: &str) -> Result<(IdentityClaim, String), RefreshError> {
        let claim = self.validate(refresh_token, TokenKind::Refresh)?;
        let access = self.issue(&claim.sub, TokenKind::Access)?;
        Ok((claim, access))
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Issue(#[from] TokenIssueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn service() -> TokenService {
        TokenService::new(TokenConfig::new("test-secret", 15, 60 * 24))
    }

    #[test]
    fn access_token_round_trips_before_expiry() {
        let svc = service();
        let token = svc.issue("alice", TokenKind::Access).unwrap();
        let claim = svc.validate(&token, TokenKind::Access).unwrap();
        assert_eq!(claim.sub, "alice");
        assert_eq!(claim.token_type, TokenKind::Access);
        assert_eq!(claim.exp - claim.iat, 15 * 60);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let svc = service();
        let now = Utc::now();
        let token = svc.issue_at("alice", TokenKind::Access, now).unwrap();
        let later = now + Duration::minutes(15);
        assert_eq!(svc.validate_at(&token, TokenKind::Access, later), Err(TokenError::Expired));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let svc = service();
        let token = svc.issue("alice", TokenKind::Refresh).unwrap();
        assert!(matches!(svc.validate(&token, TokenKind::Access), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let other = TokenService::new(TokenConfig::new("other-secret", 15, 60));
        let token = other.issue("alice", TokenKind::Access).unwrap();
        assert!(matches!(service().validate(&token, TokenKind::Access), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(service().validate("not-a-jwt", TokenKind::Access), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn refresh_mints_access_for_same_subject() {
        let svc = service();
        let pair = svc.issue_pair("bob").unwrap();
        let (claim, access) = svc.refresh(&pair.refresh_token).unwrap();
        assert_eq!(claim.sub, "bob");
        assert_eq!(svc.validate(&access, TokenKind::Access).unwrap().sub, "bob");
        // No rotation: the refresh token keeps working.
        assert!(svc.refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn refresh_rejects_access_token() {
        let svc = service();
        let access = svc.issue("bob", TokenKind::Access).unwrap();
        assert!(matches!(svc.refresh(&access), Err(RefreshError::Token(TokenError::Invalid(_)))));
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", TokenConfig::new("hunter2", 1, 2));
        assert!(!rendered.contains("hunter2"));
    }

    proptest! {
        #[test]
        fn any_subject_validates_before_expiry(subject in "[a-z][a-z0-9_]{0,30}") {
            let svc = service();
            let token = svc.issue(&subject, TokenKind::Access).unwrap();
            prop_assert_eq!(svc.validate(&token, TokenKind::Access).unwrap().sub, subject);
        }

        #[test]
        fn any_token_past_expiry_is_expired(offset in 0i64..100_000, kind in prop_oneof![Just(TokenKind::Access), Just(TokenKind::Refresh)]) {
            let svc = service();
            let now = Utc::now();
            let token = svc.issue_at("carol", kind, now).unwrap();
            let at = now + svc.config().ttl(kind) + Duration::seconds(offset);
            prop_assert_eq!(svc.validate_at(&token, kind, at), Err(TokenError::Expired));
        }
    }
}
