//! Relational directory seam.
//!
//! Partners, topics, permissions, subscriptions and user accounts live in a
//! relational store owned elsewhere. The resolver only needs the queries below.

use relay_core::{
    NewTopic, Page, Partner, PartnerId, Permission, PermissionId, Subscription, SubscriptionId, Topic,
    TopicId, UserAccount,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Backend unreachable or the query failed.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// Unique constraint violated.
    #[error("directory conflict: {0}")]
    Conflict(String),

    /// A row could not be decoded.
    #[error("corrupt directory row: {0}")]
    Corrupt(String),
}

#[async_trait::async_trait]
pub trait DirectoryStore: Send + Sync {
    // ───── Partners ─────

    async fn find_partner(&self, id: PartnerId) -> Result<Option<Partner>, DirectoryError>;

    async fn list_partners(&self, page: Page) -> Result<Vec<Partner>, DirectoryError>;

    // ───── Topics ─────

    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, DirectoryError>;

    /// Topics owned by `partner` or granted to it, ordered by id.
    /// `owner` narrows the result to one owning partner.
    async fn list_visible_topics(
        &self,
        partner: PartnerId,
        owner: Option<PartnerId>,
        page: Page,
    ) -> Result<Vec<Topic>, DirectoryError>;

    /// Ids of every topic visible to `partner`, unpaginated.
    async fn visible_topic_ids(&self, partner: PartnerId) -> Result<Vec<TopicId>, DirectoryError>;

    async fn insert_topic(&self, owner: PartnerId, topic: NewTopic) -> Result<Topic, DirectoryError>;

    async fn update_topic(&self, topic: &Topic) -> Result<(), DirectoryError>;

    /// Removes the topic with its permissions and subscriptions.
    async fn delete_topic(&self, id: TopicId) -> Result<bool, DirectoryError>;

    // ───── Permissions ─────

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, DirectoryError>;

    async fn find_permission_for(
        &self,
        topic: TopicId,
        partner: PartnerId,
    ) -> Result<Option<Permission>, DirectoryError>;

    async fn list_partner_permissions(&self, partner: PartnerId, page: Page) -> Result<Vec<Permission>, DirectoryError>;

    async fn list_topic_permissions(&self, topic: TopicId) -> Result<Vec<Permission>, DirectoryError>;

    /// Fails with `Conflict` when the (topic, partner) pair already exists.
    async fn insert_permission(&self, topic: TopicId, partner: PartnerId) -> Result<Permission, DirectoryError>;

    /// Delete the grant and the grantee's subscriptions on its topic as one
    /// unit. `None` when no such grant exists, otherwise the subscriptions dropped.
    async fn revoke_permission(&self, id: PermissionId) -> Result<Option<u64>, DirectoryError>;

    // ───── Subscriptions ─────

    async fn find_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, DirectoryError>;

    async fn list_topic_subscriptions(&self, topic: TopicId) -> Result<Vec<Subscription>, DirectoryError>;

    async fn insert_subscription(
        &self,
        topic: TopicId,
        partner: PartnerId,
        url: &str,
    ) -> Result<Subscription, DirectoryError>;

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<bool, DirectoryError>;

    // ───── Accounts ─────

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError>;
}
