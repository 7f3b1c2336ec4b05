use serde::Serialize;

use relay_core::{PartnerId, UserAccount, UserId};

/// Authenticated caller: the account behind a valid access token and the
/// partner it acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub partner_id: PartnerId,
}

impl From<&UserAccount> for Principal {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            partner_id: account.partner_id,
        }
    }
}
