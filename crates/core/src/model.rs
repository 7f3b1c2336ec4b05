//! Directory records: partners, topics, permission grants, subscriptions and
//! the user accounts that authenticate on a partner's behalf.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{PartnerId, PermissionId, SubscriptionId, TopicId, UserId};

/// A tenant. Referenced by the relay, never mutated by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    pub description: Option<String>,
}

/// A channel owned by exactly one partner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub description: Option<String>,
    pub partner_id: PartnerId,
    /// Example message document published alongside the topic.
    pub json_template: Option<String>,
}

impl Topic {
    pub fn is_owned_by(&self, partner: PartnerId) -> bool {
        self.partner_id == partner
    }
}

/// Grant of access on `topic_id` to a partner that does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub topic_id: TopicId,
    pub partner_id: PartnerId,
}

/// Webhook registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub url: String,
    pub topic_id: TopicId,
    pub partner_id: PartnerId,
}

/// Login identity bound to a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub partner_id: PartnerId,
    /// PHC-formatted password hash. Never serialized.
    pub password_hash: String,
}

/// Fields of a topic supplied by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub json_template: Option<String>,
}

impl NewTopic {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("topic name must not be empty"));
        }
        Ok(())
    }
}

/// Partial update of a topic. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub json_template: Option<String>,
}

impl TopicPatch {
    pub fn apply(&self, topic: &mut Topic) -> DomainResult<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("topic name must not be empty"));
            }
            topic.name = name.clone();
        }
        if let Some(description) = &self.description {
            topic.description = Some(description.clone());
        }
        if let Some(template) = &self.json_template {
            topic.json_template = Some(template.clone());
        }
        Ok(())
    }
}

impl Entity for Partner {
    type Id = PartnerId;

    fn id(&self) -> PartnerId {
        self.id
    }
}

impl Entity for Topic {
    type Id = TopicId;

    fn id(&self) -> TopicId {
        self.id
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> PermissionId {
        self.id
    }
}

impl Entity for Subscription {
    type Id = SubscriptionId;

    fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Entity for UserAccount {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}
