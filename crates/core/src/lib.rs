//! Shared vocabulary of the message relay.
//!
//! Identifiers, directory records and the domain error model. No I/O lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod model;
pub mod page;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{MessageId, PartnerId, PermissionId, SubscriptionId, TopicId, UserId};
pub use model::{NewTopic, Partner, Permission, Subscription, Topic, TopicPatch, UserAccount};
pub use page::Page;
