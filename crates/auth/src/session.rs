//! Credential login, token refresh and bearer authentication.

use std::sync::Arc;

use thiserror::Error;

use crate::claims::{TokenError, TokenKind};
use crate::directory::{DirectoryError, DirectoryStore};
use crate::password::{PasswordError, PasswordHasher};
use crate::principal::Principal;
use crate::token::{RefreshError, TokenIssueError, TokenPair, TokenService};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("user not exists")]
    UnknownUser,

    #[error("wrong password")]
    WrongPassword,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Issue(#[from] TokenIssueError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl From<RefreshError> for LoginError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Token(e) => LoginError::Token(e),
            RefreshError::Issue(e) => LoginError::Issue(e),
        }
    }
}

pub struct Authenticator {
    tokens: Arc<TokenService>,
    directory: Arc<dyn DirectoryStore>,
    hasher: PasswordHasher,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, directory: Arc<dyn DirectoryStore>, hasher: PasswordHasher) -> Self {
        Self { tokens, directory, hasher }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, LoginError> {
        let account = self
            .directory
            .find_user_by_username(username)
            .await?
            .ok_or(LoginError::UnknownUser)?;

        if !self.hasher.verify(password, &account.password_hash)? {
            tracing::info!(user_id = %account.id, "login rejected");
            return Err(LoginError::WrongPassword);
        }

        tracing::info!(user_id = %account.id, "login succeeded");
        Ok(self.tokens.issue_pair(&account.username)?)
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, LoginError> {
        let (claim, access) = self.tokens.refresh(refresh_token)?;
        // Accounts deleted after issuance lose the ability to refresh.
        if self.directory.find_user_by_username(&claim.sub).await?.is_none() {
            return Err(LoginError::Token(TokenError::Invalid("unknown subject")));
        }
        Ok(access)
    }

    /// Resolve a bearer access token to the principal it was issued to.
    pub async fn authenticate(&self, access_token: &str) -> Result<Principal, LoginError> {
        let claim = self.tokens.validate(access_token, TokenKind::Access)?;
        let account = self
            .directory
            .find_user_by_username(&claim.sub)
            .await?
            .ok_or(LoginError::Token(TokenError::Invalid("unknown subject")))?;
        Ok(Principal::from(&account))
    }
}
