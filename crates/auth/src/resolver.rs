//! Authorization Resolver: decides which topics a partner may act upon and
//! owns every permission and subscription mutation.
//!
//! The partner passed in is always the one bound to the validated token,
//! never a client-supplied value.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use relay_core::{
    DomainError, NewTopic, Page, Partner, PartnerId, Permission, PermissionId, Subscription, SubscriptionId,
    Topic, TopicId, TopicPatch,
};

use crate::directory::{DirectoryError, DirectoryStore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("topic not found")]
    TopicNotFound,

    #[error("partner not found")]
    PartnerNotFound,

    /// The topic exists but the partner neither owns it nor holds a grant.
    #[error("permission denied")]
    Forbidden,

    #[error("permission already exists")]
    PermissionAlreadyExists,

    #[error("permission not found")]
    PermissionNotFound,

    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

pub struct AuthorizationResolver {
    directory: Arc<dyn DirectoryStore>,
}

impl AuthorizationResolver {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    // ───── Access checks ─────

    /// Owner or grantee passes; other partners get `Forbidden` on an existing
    /// topic and `TopicNotFound` on an absent one.
    #[instrument(skip(self), fields(topic_id = %topic_id, partner_id = %partner_id), err)]
    pub async fn assert_can_access_topic(&self, topic_id: TopicId, partner_id: PartnerId) -> Result<Topic, AccessError> {
        let topic = self
            .directory
            .find_topic(topic_id)
            .await?
            .ok_or(AccessError::TopicNotFound)?;

        if topic.is_owned_by(partner_id) {
            return Ok(topic);
        }

        match self.directory.find_permission_for(topic_id, partner_id).await? {
            Some(_) => Ok(topic),
            None => Err(AccessError::Forbidden),
        }
    }

    /// Owned topics plus granted topics.
    pub async fn list_accessible_topics(&self, partner_id: PartnerId) -> Result<Vec<TopicId>, AccessError> {
        Ok(self.directory.visible_topic_ids(partner_id).await?)
    }

    pub async fn check_permission(&self, topic_id: TopicId, partner_id: PartnerId) -> Result<bool, AccessError> {
        match self.assert_can_access_topic(topic_id, partner_id).await {
            Ok(_) => Ok(true),
            Err(AccessError::Forbidden | AccessError::TopicNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ───── Partners ─────

    pub async fn list_partners(&self, page: Page) -> Result<Vec<Partner>, AccessError> {
        Ok(self.directory.list_partners(page).await?)
    }

    pub async fn get_partner(&self, id: PartnerId) -> Result<Partner, AccessError> {
        self.directory.find_partner(id).await?.ok_or(AccessError::PartnerNotFound)
    }

    // ───── Topics ─────

    /// Reads a topic visible to `partner_id`. Invisible topics read as absent.
    pub async fn get_topic(&self, topic_id: TopicId, partner_id: PartnerId) -> Result<Topic, AccessError> {
        match self.assert_can_access_topic(topic_id, partner_id).await {
            Err(AccessError::Forbidden) => Err(AccessError::TopicNotFound),
            other => other,
        }
    }

    pub async fn list_topics(
        &self,
        partner_id: PartnerId,
        owner: Option<PartnerId>,
        page: Page,
    ) -> Result<Vec<Topic>, AccessError> {
        Ok(self.directory.list_visible_topics(partner_id, owner, page).await?)
    }

    pub async fn list_my_topics(&self, partner_id: PartnerId, page: Page) -> Result<Vec<Topic>, AccessError> {
        self.list_topics(partner_id, Some(partner_id), page).await
    }

    #[instrument(skip(self, draft), fields(partner_id = %partner_id), err)]
    pub async fn create_topic(&self, partner_id: PartnerId, draft: NewTopic) -> Result<Topic, AccessError> {
        draft.validate()?;
        self.get_partner(partner_id).await?;
        let topic = self.directory.insert_topic(partner_id, draft).await?;
        tracing::info!(topic_id = %topic.id, "topic created");
        Ok(topic)
    }

    pub async fn edit_topic(
        &self,
        topic_id: TopicId,
        partner_id: PartnerId,
        patch: TopicPatch,
    ) -> Result<Topic, AccessError> {
        let mut topic = self.owned_topic(topic_id, partner_id).await?;
        patch.apply(&mut topic)?;
        self.directory.update_topic(&topic).await?;
        Ok(topic)
    }

    #[instrument(skip(self), fields(topic_id = %topic_id, partner_id = %partner_id), err)]
    pub async fn delete_topic(&self, topic_id: TopicId, partner_id: PartnerId) -> Result<(), AccessError> {
        self.owned_topic(topic_id, partner_id).await?;
        if !self.directory.delete_topic(topic_id).await? {
            return Err(AccessError::TopicNotFound);
        }
        Ok(())
    }

    async fn owned_topic(&self, topic_id: TopicId, partner_id: PartnerId) -> Result<Topic, AccessError> {
        let topic = self
            .directory
            .find_topic(topic_id)
            .await?
            .ok_or(AccessError::TopicNotFound)?;
        if !topic.is_owned_by(partner_id) {
            return Err(AccessError::Forbidden);
        }
        Ok(topic)
    }

    // ───── Permissions ─────

    pub async fn list_my_permissions(&self, partner_id: PartnerId, page: Page) -> Result<Vec<Permission>, AccessError> {
        Ok(self.directory.list_partner_permissions(partner_id, page).await?)
    }

    /// The owner sees every grant on the topic; a grantee sees only its own.
    pub async fn permissions_for_topic(
        &self,
        topic_id: TopicId,
        partner_id: PartnerId,
    ) -> Result<Vec<Permission>, AccessError> {
        let topic = self.assert_can_access_topic(topic_id, partner_id).await?;
        let mut permissions = self.directory.list_topic_permissions(topic_id).await?;
        if !topic.is_owned_by(partner_id) {
            permissions.retain(|p| p.partner_id == partner_id);
        }
        Ok(permissions)
    }

    /// Grant `grantee` access to `topic_id` on behalf of `current`.
    ///
    /// Checks run in a fixed order: duplicate grant, grantee existence, then
    /// the caller's own access to the topic.
    #[instrument(skip(self), fields(topic_id = %topic_id, grantee = %grantee, partner_id = %current), err)]
    pub async fn create_permission(
        &self,
        topic_id: TopicId,
        grantee: PartnerId,
        current: PartnerId,
    ) -> Result<Permission, AccessError> {
        if self.directory.find_permission_for(topic_id, grantee).await?.is_some() {
            return Err(AccessError::PermissionAlreadyExists);
        }
        if self.directory.find_partner(grantee).await?.is_none() {
            return Err(AccessError::PartnerNotFound);
        }
        self.assert_can_access_topic(topic_id, current).await?;

        let permission = self
            .directory
            .insert_permission(topic_id, grantee)
            .await
            .map_err(|e| match e {
                DirectoryError::Conflict(_) => AccessError::PermissionAlreadyExists,
                other => AccessError::Directory(other),
            })?;
        tracing::info!(permission_id = %permission.id, "permission granted");
        Ok(permission)
    }

    /// Revoke a grant by id. The grantee's subscriptions on the topic go with it.
    #[instrument(skip(self), fields(permission_id = %permission_id, partner_id = %current), err)]
    pub async fn delete_permission(&self, permission_id: PermissionId, current: PartnerId) -> Result<(), AccessError> {
        let permission = self
            .directory
            .find_permission(permission_id)
            .await?
            .ok_or(AccessError::PermissionNotFound)?;
        self.assert_can_access_topic(permission.topic_id, current).await?;
        self.revoke(&permission).await
    }

    /// Revoke the grant held by `grantee` on `topic_id`.
    #[instrument(skip(self), fields(topic_id = %topic_id, grantee = %grantee, partner_id = %current), err)]
    pub async fn delete_permission_for(
        &self,
        grantee: PartnerId,
        topic_id: TopicId,
        current: PartnerId,
    ) -> Result<(), AccessError> {
        self.assert_can_access_topic(topic_id, current).await?;
        let permission = self
            .directory
            .find_permission_for(topic_id, grantee)
            .await?
            .ok_or(AccessError::PermissionNotFound)?;
        self.revoke(&permission).await
    }

    async fn revoke(&self, permission: &Permission) -> Result<(), AccessError> {
        let dropped = self
            .directory
            .revoke_permission(permission.id)
            .await?
            .ok_or(AccessError::PermissionNotFound)?;
        tracing::info!(permission_id = %permission.id, dropped_subscriptions = dropped, "permission revoked");
        Ok(())
    }

    // ───── Subscriptions ─────

    /// Subscriptions are private to the partner that registered them.
    pub async fn get_subscription(&self, raw_id: i64, current: PartnerId) -> Result<Subscription, AccessError> {
        let id = SubscriptionId::positive(raw_id)
            .map_err(|_| DomainError::validation("invalid subscription id"))?;
        match self.directory.find_subscription(id).await? {
            Some(sub) if sub.partner_id == current => Ok(sub),
            _ => Err(AccessError::SubscriptionNotFound),
        }
    }

    #[instrument(skip(self), fields(topic_id = %topic_id, partner_id = %current), err)]
    pub async fn create_subscription(
        &self,
        topic_id: TopicId,
        url: &str,
        current: PartnerId,
    ) -> Result<Subscription, AccessError> {
        self.assert_can_access_topic(topic_id, current).await?;
        validate_webhook_url(url)?;
        Ok(self.directory.insert_subscription(topic_id, current, url).await?)
    }

    pub async fn delete_subscription(&self, raw_id: i64, current: PartnerId) -> Result<(), AccessError> {
        let sub = self.get_subscription(raw_id, current).await?;
        if !self.directory.delete_subscription(sub.id).await? {
            return Err(AccessError::SubscriptionNotFound);
        }
        Ok(())
    }

    /// The owner sees every subscription on the topic; a grantee sees only its own.
    pub async fn topic_subscriptions(
        &self,
        topic_id: TopicId,
        current: PartnerId,
    ) -> Result<Vec<Subscription>, AccessError> {
        let topic = self.assert_can_access_topic(topic_id, current).await?;
        let mut subs = self.directory.list_topic_subscriptions(topic_id).await?;
        if !topic.is_owned_by(current) {
            subs.retain(|s| s.partner_id == current);
        }
        Ok(subs)
    }

    /// Delivery targets for a topic, in registration order.
    pub async fn subscriber_urls(&self, topic_id: TopicId) -> Result<Vec<String>, AccessError> {
        let subs = self.directory.list_topic_subscriptions(topic_id).await?;
        Ok(subs.into_iter().map(|s| s.url).collect())
    }
}

fn validate_webhook_url(raw: &str) -> Result<(), DomainError> {
    let parsed = url::Url::parse(raw).map_err(|e| DomainError::validation(format!("invalid webhook url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(()),
        _ => Err(DomainError::validation("webhook url must be an absolute http(s) url")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_urls_must_be_http() {
        assert!(validate_webhook_url("https://hooks.example.com/relay").is_ok());
        assert!(validate_webhook_url("http://127.0.0.1:8001/webhook").is_ok());
        assert!(validate_webhook_url("ftp://example.com").is_err());
        assert!(validate_webhook_url("/relative").is_err());
    }

    #[test]
    fn forbidden_renders_as_permission_denied() {
        assert_eq!(AccessError::Forbidden.to_string(), "permission denied");
    }
}
