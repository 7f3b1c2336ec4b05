use serde::{Deserialize, Serialize};

use relay_core::{Page, PartnerId, TopicId, UserId};

// ───── Requests ─────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// `?skip=&limit=` plus the optional owner filter on topic listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub partner_id: Option<PartnerId>,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        Page::new(self.skip, self.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePermissionRequest {
    pub topic_id: TopicId,
    pub partner_id: PartnerId,
}

/// `DELETE /permissions?partner_id=&topic_id=`
#[derive(Debug, Deserialize)]
pub struct RevokeQuery {
    pub partner_id: PartnerId,
    pub topic_id: TopicId,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub topic_id: TopicId,
    pub url: String,
}

// ───── Responses ─────

#[derive(Debug, Serialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationResponse {
    pub user_id: UserId,
    pub partner_id: PartnerId,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub topic_id: TopicId,
    pub allowed: bool,
}
