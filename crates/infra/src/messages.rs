//! Message Store Gateway: the persistence boundary for published messages.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use relay_core::{DomainError, MessageId, TopicId};

use crate::document_store::{Document, DocumentStore, DocumentStoreError};

pub const MESSAGES_COLLECTION: &str = "messages";

/// A stored message. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    /// Caller-supplied correlation id. Not unique.
    pub unique_id: Option<i64>,
    pub topic_id: TopicId,
    pub payload: Document,
    pub created_date: DateTime<Utc>,
}

/// A message as submitted by a publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub topic_id: TopicId,
    pub unique_id: Option<i64>,
    pub payload: Value,
}

impl Message {
    /// Validate a submission and stamp `created_date`.
    ///
    /// A `created_date` already present in the payload is kept verbatim and,
    /// when it parses as RFC 3339, also becomes the message timestamp.
    pub fn from_new(new: NewMessage, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let Value::Object(mut payload) = new.payload else {
            return Err(DomainError::validation("message payload must be a JSON object"));
        };

        let created_date = match payload.get("created_date") {
            Some(Value::String(raw)) => DateTime::parse_from_rfc3339(raw)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now),
            Some(_) => now,
            None => {
                payload.insert(
                    "created_date".into(),
                    Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
                );
                now
            }
        };

        Ok(Self {
            id: MessageId::new(),
            unique_id: new.unique_id,
            topic_id: new.topic_id,
            payload,
            created_date,
        })
    }

    fn to_document(&self) -> Result<Document, DocumentStoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut doc)) => {
                doc.insert("_id".into(), Value::String(self.id.to_string()));
                Ok(doc)
            }
            Ok(_) => Err(DocumentStoreError::Malformed("message did not serialize to a document".into())),
            Err(e) => Err(DocumentStoreError::Malformed(e.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("message store timed out")]
    TimedOut,

    #[error(transparent)]
    Validation(#[from] DomainError),

    #[error(transparent)]
    Store(DocumentStoreError),
}

impl From<DocumentStoreError> for GatewayError {
    fn from(err: DocumentStoreError) -> Self {
        match err {
            DocumentStoreError::TimedOut => GatewayError::TimedOut,
            other => GatewayError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct MessageStoreGateway {
    store: Arc<dyn DocumentStore>,
}

impl MessageStoreGateway {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, message), fields(topic_id = %message.topic_id), err)]
    pub async fn create(&self, message: NewMessage) -> Result<Message, GatewayError> {
        let message = Message::from_new(message, Utc::now())?;
        self.store
            .insert_one(MESSAGES_COLLECTION, message.to_document()?)
            .await?;
        Ok(message)
    }

    /// Bulk insert in the order supplied. Nothing is written if any submission is invalid.
    #[instrument(skip(self, messages), fields(count = messages.len()), err)]
    pub async fn create_all(&self, messages: Vec<NewMessage>) -> Result<Vec<Message>, GatewayError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let messages = messages
            .into_iter()
            .map(|m| Message::from_new(m, now))
            .collect::<Result<Vec<_>, _>>()?;
        let documents = messages
            .iter()
            .map(Message::to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.insert_many(MESSAGES_COLLECTION, documents).await?;
        Ok(messages)
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.len()), err)]
    pub async fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, GatewayError> {
        Ok(self.store.aggregate(MESSAGES_COLLECTION, pipeline).await?)
    }
}
