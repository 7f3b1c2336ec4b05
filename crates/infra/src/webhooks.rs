//! Webhook Fan-out Notifier.
//!
//! One `notify` call POSTs the message to every URL concurrently and waits for
//! all attempts. A failing URL never cancels or delays the others. No retries.

use std::time::Duration;

use futures::future::join_all;
use reqwest::{redirect::Policy, Client};
use serde::Serialize;
use thiserror::Error;

use crate::messages::Message;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Upper bound on a single delivery attempt.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("relay-webhooks/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Outcome counts for one or more `notify` calls.
///
/// `attempted` counts dispatches; `delivered` counts 2xx acknowledgements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
}

impl DeliveryReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.delivered
    }
}

impl core::ops::AddAssign for DeliveryReport {
    fn add_assign(&mut self, rhs: Self) {
        self.attempted += rhs.attempted;
        self.delivered += rhs.delivered;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("failed to build webhook client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        Self { config }
    }

    /// Deliver `message` to every URL and report how many acknowledged it.
    pub async fn notify(&self, message: &Message, urls: &[String]) -> Result<DeliveryReport, NotifyError> {
        if urls.is_empty() {
            return Ok(DeliveryReport::default());
        }

        // The client (and its connection pool) lives for this call only and is
        // dropped on return, error or cancellation.
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent.as_str())
            .redirect(Policy::none())
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;

        let outcomes = join_all(urls.iter().map(|url| deliver(&client, url, message))).await;

        let report = DeliveryReport {
            attempted: outcomes.len(),
            delivered: outcomes.into_iter().filter(|ok| *ok).count(),
        };
        tracing::info!(
            message_id = %message.id,
            topic_id = %message.topic_id,
            attempted = report.attempted,
            delivered = report.delivered,
            "webhook fan-out finished"
        );
        Ok(report)
    }
}

async fn deliver(client: &Client, url: &str, message: &Message) -> bool {
    match client.post(url).json(message).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::debug!(url, status = resp.status().as_u16(), "webhook delivered");
            true
        }
        Ok(resp) => {
            tracing::warn!(url, status = resp.status().as_u16(), "webhook rejected");
            false
        }
        Err(e) => {
            tracing::warn!(url, error = %e, "webhook delivery failed");
            false
        }
    }
}
