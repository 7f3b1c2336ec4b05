//! Publishing: authorize, persist, then optionally fan out.
//!
//! Subscriber URLs are resolved before anything is stored. Once messages are
//! stored the publish succeeds; a failed fan-out only shows up in the counts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use relay_auth::{AccessError, TopicAccess};
use relay_core::{MessageId, PartnerId, TopicId};

use crate::messages::{GatewayError, Message, MessageStoreGateway, NewMessage};
use crate::webhooks::{DeliveryReport, WebhookNotifier};

/// Most payloads a single bulk send may notify about.
pub const MAX_NOTIFICATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendRequest {
    pub topic_id: TopicId,
    #[serde(default)]
    pub unique_id: Option<i64>,
    pub payload: Value,
    #[serde(default)]
    pub is_notify: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PayloadItem {
    pub payload: Value,
    #[serde(default)]
    pub unique_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendAllRequest {
    pub topic_id: TopicId,
    pub payloads: Vec<PayloadItem>,
    #[serde(default)]
    pub is_notify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub message_ids: Vec<MessageId>,
    /// Acknowledged deliveries.
    pub webhooks_count: usize,
    pub webhooks_attempted: usize,
}

impl PublishReceipt {
    fn new(messages: &[Message], report: DeliveryReport) -> Self {
        Self {
            message_ids: messages.iter().map(|m| m.id).collect(),
            webhooks_count: report.delivered,
            webhooks_attempted: report.attempted,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("too many notifications: {requested} payloads exceed the limit of {limit}")]
    TooManyNotifications { requested: usize, limit: usize },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

pub struct MessagePublisher {
    gateway: MessageStoreGateway,
    access: Arc<dyn TopicAccess>,
    notifier: WebhookNotifier,
    max_notifications: usize,
}

impl MessagePublisher {
    pub fn new(gateway: MessageStoreGateway, access: Arc<dyn TopicAccess>, notifier: WebhookNotifier) -> Self {
        Self { gateway, access, notifier, max_notifications: MAX_NOTIFICATIONS }
    }

    pub fn with_max_notifications(mut self, max: usize) -> Self {
        self.max_notifications = max;
        self
    }

    #[instrument(skip(self, request), fields(partner_id = %partner, topic_id = %request.topic_id), err)]
    pub async fn send(&self, partner: PartnerId, request: SendRequest) -> Result<PublishReceipt, PublishError> {
        self.access.check_access(partner, request.topic_id).await?;
        let urls = self.subscribers(request.topic_id, request.is_notify).await?;

        let message = self
            .gateway
            .create(NewMessage {
                topic_id: request.topic_id,
                unique_id: request.unique_id,
                payload: request.payload,
            })
            .await?;

        let report = self.fan_out(&message, &urls).await;
        Ok(PublishReceipt::new(std::slice::from_ref(&message), report))
    }

    /// Bulk publish. An oversized notifying batch is refused before anything
    /// is checked, stored or sent.
    #[instrument(
        skip(self, request),
        fields(partner_id = %partner, topic_id = %request.topic_id, count = request.payloads.len()),
        err
    )]
    pub async fn send_all(&self, partner: PartnerId, request: SendAllRequest) -> Result<PublishReceipt, PublishError> {
        if request.is_notify && request.payloads.len() > self.max_notifications {
            return Err(PublishError::TooManyNotifications {
                requested: request.payloads.len(),
                limit: self.max_notifications,
            });
        }

        self.access.check_access(partner, request.topic_id).await?;
        if request.payloads.is_empty() {
            return Ok(PublishReceipt::default());
        }

        let topic_id = request.topic_id;
        let urls = self.subscribers(topic_id, request.is_notify).await?;
        let messages = self
            .gateway
            .create_all(
                request
                    .payloads
                    .into_iter()
                    .map(|item| NewMessage { topic_id, unique_id: item.unique_id, payload: item.payload })
                    .collect(),
            )
            .await?;

        let mut report = DeliveryReport::default();
        for message in &messages {
            report += self.fan_out(message, &urls).await;
        }
        Ok(PublishReceipt::new(&messages, report))
    }

    async fn subscribers(&self, topic_id: TopicId, is_notify: bool) -> Result<Vec<String>, AccessError> {
        if is_notify { self.access.subscriber_urls(topic_id).await } else { Ok(Vec::new()) }
    }

    async fn fan_out(&self, message: &Message, urls: &[String]) -> DeliveryReport {
        match self.notifier.notify(message, urls).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(message_id = %message.id, error = %e, "webhook fan-out skipped");
                DeliveryReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{DocumentStore, InMemoryDocumentStore};
    use relay_auth::{DirectoryError, FixedTopicAccess};
    use serde_json::json;

    fn publisher(store: Arc<InMemoryDocumentStore>, access: FixedTopicAccess) -> MessagePublisher {
        MessagePublisher::new(
            MessageStoreGateway::new(store),
            Arc::new(access),
            WebhookNotifier::default(),
        )
    }

    fn batch(n: usize, is_notify: bool) -> SendAllRequest {
        SendAllRequest {
            topic_id: TopicId::new(1),
            payloads: (0..n)
                .map(|i| PayloadItem { payload: json!({ "seq": i }), unique_id: Some(i as i64) })
                .collect(),
            is_notify,
        }
    }

    #[tokio::test]
    async fn oversized_notifying_batch_is_refused_before_persistence() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher(store.clone(), FixedTopicAccess::allowing(vec![], vec![]));

        let err = publisher.send_all(PartnerId::new(1), batch(101, true)).await.unwrap_err();

        assert_eq!(err, PublishError::TooManyNotifications { requested: 101, limit: 100 });
        assert_eq!(store.inserted_count(), 0);
    }

    #[tokio::test]
    async fn ceiling_is_inclusive_and_silent_batches_are_unbounded() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher(store.clone(), FixedTopicAccess::allowing(vec![], vec![]));

        publisher.send_all(PartnerId::new(1), batch(100, true)).await.unwrap();
        publisher.send_all(PartnerId::new(1), batch(150, false)).await.unwrap();
        assert_eq!(store.inserted_count(), 250);
    }

    #[tokio::test]
    async fn denied_topic_is_not_written() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher(store.clone(), FixedTopicAccess::denying());

        let err = publisher
            .send(
                PartnerId::new(1),
                SendRequest { topic_id: TopicId::new(1), unique_id: None, payload: json!({}), is_notify: false },
            )
            .await
            .unwrap_err();
        assert_eq!(err, PublishError::Access(AccessError::Forbidden));
        assert_eq!(store.inserted_count(), 0);
    }

    #[tokio::test]
    async fn bulk_insert_preserves_order() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher(store.clone(), FixedTopicAccess::allowing(vec![], vec![]));
        let receipt = publisher.send_all(PartnerId::new(1), batch(5, false)).await.unwrap();
        assert_eq!(receipt.message_ids.len(), 5);
        assert_eq!(receipt.webhooks_attempted, 0);

        let docs = store
            .find(crate::messages::MESSAGES_COLLECTION, &Default::default(), None)
            .await
            .unwrap();
        let seqs: Vec<_> = docs.iter().map(|d| d["payload"]["seq"].clone()).collect();
        assert_eq!(seqs, (0..5).map(|i| json!(i)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn notify_without_subscribers_attempts_nothing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher(store, FixedTopicAccess::allowing(vec![], vec![]));
        let receipt = publisher
            .send(
                PartnerId::new(1),
                SendRequest { topic_id: TopicId::new(1), unique_id: Some(3), payload: json!({"a": 1}), is_notify: true },
            )
            .await
            .unwrap();
        assert_eq!(receipt.message_ids.len(), 1);
        assert_eq!(receipt.webhooks_count, 0);
    }

    /// Access passes but the subscriber lookup fails.
    struct UnreachableSubscribers;

    #[async_trait::async_trait]
    impl TopicAccess for UnreachableSubscribers {
        async fn check_access(&self, _partner: PartnerId, _topic: TopicId) -> Result<(), AccessError> {
            Ok(())
        }

        async fn accessible_topics(&self, _partner: PartnerId) -> Result<Vec<TopicId>, AccessError> {
            Ok(vec![TopicId::new(1)])
        }

        async fn subscriber_urls(&self, _topic: TopicId) -> Result<Vec<String>, AccessError> {
            Err(AccessError::Directory(DirectoryError::Unavailable("directory offline".into())))
        }
    }

    fn publisher_with(store: Arc<InMemoryDocumentStore>, access: impl TopicAccess + 'static) -> MessagePublisher {
        MessagePublisher::new(MessageStoreGateway::new(store), Arc::new(access), WebhookNotifier::default())
    }

    #[tokio::test]
    async fn failed_subscriber_lookup_stores_nothing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher_with(store.clone(), UnreachableSubscribers);
        let request =
            SendRequest { topic_id: TopicId::new(1), unique_id: Some(1), payload: json!({"a": 1}), is_notify: true };

        for _ in 0..2 {
            let err = publisher.send(PartnerId::new(1), request.clone()).await.unwrap_err();
            assert!(matches!(err, PublishError::Access(AccessError::Directory(_))));
        }
        let err = publisher.send_all(PartnerId::new(1), batch(3, true)).await.unwrap_err();
        assert!(matches!(err, PublishError::Access(AccessError::Directory(_))));

        assert_eq!(store.inserted_count(), 0);
    }

    #[tokio::test]
    async fn silent_send_skips_subscriber_lookup() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let publisher = publisher_with(store.clone(), UnreachableSubscribers);

        let receipt = publisher.send_all(PartnerId::new(1), batch(3, false)).await.unwrap();

        assert_eq!(receipt.message_ids.len(), 3);
        assert_eq!(store.inserted_count(), 3);
    }
}
