//! Topic access as seen by the message pipeline.
//!
//! Publishing and searching only need three answers about a topic. The live
//! variant asks the resolver; the fixed variant returns canned answers and is
//! wired in for local runs and tests that have no directory.

use std::sync::Arc;

use relay_core::{PartnerId, TopicId};

use crate::resolver::{AccessError, AuthorizationResolver};

#[async_trait::async_trait]
pub trait TopicAccess: Send + Sync {
    async fn check_access(&self, partner: PartnerId, topic: TopicId) -> Result<(), AccessError>;

    async fn accessible_topics(&self, partner: PartnerId) -> Result<Vec<TopicId>, AccessError>;

    async fn subscriber_urls(&self, topic: TopicId) -> Result<Vec<String>, AccessError>;
}

pub struct LiveTopicAccess {
    resolver: Arc<AuthorizationResolver>,
}

impl LiveTopicAccess {
    pub fn new(resolver: Arc<AuthorizationResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait::async_trait]
impl TopicAccess for LiveTopicAccess {
    async fn check_access(&self, partner: PartnerId, topic: TopicId) -> Result<(), AccessError> {
        self.resolver.assert_can_access_topic(topic, partner).await.map(|_| ())
    }

    async fn accessible_topics(&self, partner: PartnerId) -> Result<Vec<TopicId>, AccessError> {
        self.resolver.list_accessible_topics(partner).await
    }

    async fn subscriber_urls(&self, topic: TopicId) -> Result<Vec<String>, AccessError> {
        self.resolver.subscriber_urls(topic).await
    }
}

/// Canned answers, identical for every partner.
#[derive(Debug, Clone)]
pub struct FixedTopicAccess {
    pub allow: bool,
    pub topics: Vec<TopicId>,
    pub urls: Vec<String>,
}

impl FixedTopicAccess {
    pub fn allowing(topics: Vec<TopicId>, urls: Vec<String>) -> Self {
        Self { allow: true, topics, urls }
    }

    pub fn denying() -> Self {
        Self { allow: false, topics: Vec::new(), urls: Vec::new() }
    }
}

impl Default for FixedTopicAccess {
    fn default() -> Self {
        Self::allowing(
            vec![TopicId::new(1), TopicId::new(2), TopicId::new(3)],
            vec!["http://localhost:8001/webhook".to_string()],
        )
    }
}

#[async_trait::async_trait]
impl TopicAccess for FixedTopicAccess {
    async fn check_access(&self, _partner: PartnerId, _topic: TopicId) -> Result<(), AccessError> {
        if self.allow { Ok(()) } else { Err(AccessError::Forbidden) }
    }

    async fn accessible_topics(&self, _partner: PartnerId) -> Result<Vec<TopicId>, AccessError> {
        Ok(self.topics.clone())
    }

    async fn subscriber_urls(&self, _topic: TopicId) -> Result<Vec<String>, AccessError> {
        Ok(self.urls.clone())
    }
}
