//! Identity and authorization for the relay.
//!
//! Decoupled from HTTP. Storage is reached only through [`DirectoryStore`].

pub mod claims;
pub mod directory;
pub mod password;
pub mod principal;
pub mod resolver;
pub mod session;
pub mod token;
pub mod topic_access;

pub use claims::{validate_claims, IdentityClaim, TokenError, TokenKind};
pub use directory::{DirectoryError, DirectoryStore};
pub use password::{PasswordError, PasswordHasher};
pub use principal::Principal;
pub use resolver::{AccessError, AuthorizationResolver};
pub use session::{Authenticator, LoginError};
pub use token::{RefreshError, TokenConfig, TokenIssueError, TokenPair, TokenService};
pub use topic_access::{FixedTopicAccess, LiveTopicAccess, TopicAccess};
