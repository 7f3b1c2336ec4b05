//! Infrastructure layer: stores, the search and publish pipelines, webhook
//! delivery and configuration.

pub mod config;
pub mod directory;
pub mod document_store;
pub mod messages;
pub mod publisher;
pub mod search;
pub mod webhooks;

mod integration_tests;

pub use config::RelayConfig;
pub use directory::{InMemoryDirectory, PostgresDirectory};
pub use document_store::{Document, DocumentStore, DocumentStoreError, InMemoryDocumentStore};
pub use messages::{GatewayError, Message, MessageStoreGateway, NewMessage};
pub use publisher::{MessagePublisher, PublishError, PublishReceipt, SendAllRequest, SendRequest};
pub use search::{SearchEngine, SearchError, SearchOutput, SearchPipelineBuilder, SearchRequest};
pub use webhooks::{DeliveryReport, WebhookConfig, WebhookNotifier};
