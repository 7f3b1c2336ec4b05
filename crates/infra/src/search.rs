//! Search Pipeline Builder and the engine that runs it.
//!
//! The topic-scope stage is always first and is never derived from caller
//! input, so `match`/`sort` documents cannot widen what a partner can read.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use relay_auth::{AccessError, TopicAccess};
use relay_core::{PartnerId, TopicId};

use crate::document_store::Document;
use crate::messages::{GatewayError, MessageStoreGateway};

/// Operator token that would let a query run server-side code.
pub const FORBIDDEN_OPERATOR: &str = "$where";

/// Bounded, partner-scoped search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub topic_ids: Option<Vec<TopicId>>,
    #[serde(default)]
    pub unique_ids: Option<Vec<i64>>,
    #[serde(default, rename = "match")]
    pub filter: Option<Document>,
    #[serde(default)]
    pub sort: Option<Document>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageOutput {
    pub topic_id: TopicId,
    pub payload: Document,
    #[serde(default)]
    pub unique_id: Option<i64>,
}

/// Search result. Always the same shape, empty or not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub messages: Vec<MessageOutput>,
    /// Distinct `unique_id` values among `messages`, ascending.
    pub unique_ids: Vec<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("forbidden operator in {field}")]
    ForbiddenOperator { field: &'static str },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("unexpected aggregation result: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct SearchPipelineBuilder {
    max_limit: u32,
}

impl SearchPipelineBuilder {
    pub const DEFAULT_MAX_LIMIT: u32 = 1000;

    pub fn new(max_limit: u32) -> Self {
        Self { max_limit: max_limit.max(1) }
    }

    /// Translate `request` into an aggregation pipeline over `scope`.
    ///
    /// Stage order: topic scope, unique ids, match, sort, limit, group.
    pub fn build(&self, scope: &[TopicId], request: &SearchRequest) -> Result<Vec<Document>, SearchError> {
        let mut pipeline = vec![stage("$match", json!({ "topic_id": { "$in": scope } }))];

        if let Some(unique_ids) = &request.unique_ids {
            pipeline.push(stage("$match", json!({ "unique_id": { "$in": unique_ids } })));
        }

        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_empty()) {
            reject_forbidden(filter, "match")?;
            pipeline.push(stage("$match", Value::Object(filter.clone())));
        }

        if let Some(sort) = request.sort.as_ref().filter(|s| !s.is_empty()) {
            reject_forbidden(sort, "sort")?;
            pipeline.push(stage("$sort", Value::Object(sort.clone())));
        }

        if let Some(limit) = request.limit.filter(|l| *l > 0) {
            pipeline.push(stage("$limit", json!(limit.min(self.max_limit))));
        }

        pipeline.push(stage(
            "$group",
            json!({
                "_id": null,
                "messages": { "$push": "$$ROOT" },
                "unique_ids": { "$addToSet": "$unique_id" },
            }),
        ));
        Ok(pipeline)
    }
}

impl Default for SearchPipelineBuilder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_LIMIT)
    }
}

fn stage(name: &str, spec: Value) -> Document {
    let mut doc = Document::new();
    doc.insert(name.to_string(), spec);
    doc
}

fn reject_forbidden(doc: &Document, field: &'static str) -> Result<(), SearchError> {
    let serialized = serde_json::to_string(doc).map_err(|e| SearchError::Malformed(e.to_string()))?;
    if serialized.contains(FORBIDDEN_OPERATOR) {
        tracing::warn!(field, "search rejected: forbidden operator");
        return Err(SearchError::ForbiddenOperator { field });
    }
    Ok(())
}

/// Reshape the single grouped document into [`SearchOutput`].
pub fn reshape(grouped: Vec<Document>) -> Result<SearchOutput, SearchError> {
    let Some(mut group) = grouped.into_iter().next() else {
        return Ok(SearchOutput::default());
    };

    let messages = match group.remove("messages") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(serde_json::from_value::<MessageOutput>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SearchError::Malformed(e.to_string()))?,
        Some(other) => return Err(SearchError::Malformed(format!("messages is not an array: {other}"))),
        None => Vec::new(),
    };

    let unique_ids: BTreeSet<i64> = match group.remove("unique_ids") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
        _ => BTreeSet::new(),
    };

    Ok(SearchOutput { messages, unique_ids: unique_ids.into_iter().collect() })
}

pub struct SearchEngine {
    gateway: MessageStoreGateway,
    access: Arc<dyn TopicAccess>,
    builder: SearchPipelineBuilder,
}

impl SearchEngine {
    pub fn new(gateway: MessageStoreGateway, access: Arc<dyn TopicAccess>, builder: SearchPipelineBuilder) -> Self {
        Self { gateway, access, builder }
    }

    /// Topics this search may read.
    ///
    /// Without explicit ids, every accessible topic. With explicit ids, their
    /// intersection with the accessible set; `Forbidden` if nothing survives.
    pub async fn resolve_scope(
        &self,
        partner: PartnerId,
        requested: Option<&[TopicId]>,
    ) -> Result<Vec<TopicId>, SearchError> {
        let accessible = self.access.accessible_topics(partner).await?;
        let requested = match requested {
            Some(ids) if !ids.is_empty() => ids,
            _ => return Ok(accessible),
        };

        let allowed: BTreeSet<TopicId> = accessible.into_iter().collect();
        let scope: Vec<TopicId> = requested
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|id| allowed.contains(id))
            .collect();

        if scope.is_empty() {
            return Err(SearchError::Access(AccessError::Forbidden));
        }
        if scope.len() < requested.len() {
            tracing::debug!(partner_id = %partner, "search scope narrowed to accessible topics");
        }
        Ok(scope)
    }

    #[instrument(skip(self, request), fields(partner_id = %partner), err)]
    pub async fn search(&self, partner: PartnerId, request: &SearchRequest) -> Result<SearchOutput, SearchError> {
        let scope = self.resolve_scope(partner, request.topic_ids.as_deref()).await?;
        let pipeline = self.builder.build(&scope, request)?;
        if scope.is_empty() {
            return Ok(SearchOutput::default());
        }
        let grouped = self.gateway.aggregate(&pipeline).await?;
        reshape(grouped)
    }
}
