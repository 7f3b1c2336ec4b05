//! Service wiring: one directory, one document store, and everything the
//! handlers call built on top of them.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use relay_auth::{
    Authenticator, AuthorizationResolver, DirectoryStore, LiveTopicAccess, PasswordHasher, TokenService, TopicAccess,
};
use relay_infra::{
    DocumentStore, InMemoryDirectory, InMemoryDocumentStore, MessagePublisher, MessageStoreGateway,
    PostgresDirectory, RelayConfig, SearchEngine, SearchPipelineBuilder, WebhookNotifier,
};

pub struct AppServices {
    pub authenticator: Arc<Authenticator>,
    pub resolver: Arc<AuthorizationResolver>,
    pub search: SearchEngine,
    pub publisher: MessagePublisher,
}

impl AppServices {
    /// Wire services over an explicit directory and document store.
    pub fn assemble(
        config: &RelayConfig,
        directory: Arc<dyn DirectoryStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new().context("password hasher")?;
        let tokens = Arc::new(TokenService::new(config.token_config()));
        let authenticator = Arc::new(Authenticator::new(tokens, directory.clone(), hasher));

        let resolver = Arc::new(AuthorizationResolver::new(directory));
        let access: Arc<dyn TopicAccess> = Arc::new(LiveTopicAccess::new(resolver.clone()));
        let gateway = MessageStoreGateway::new(documents);

        let search = SearchEngine::new(
            gateway.clone(),
            access.clone(),
            SearchPipelineBuilder::new(config.search.max_limit),
        );
        let publisher = MessagePublisher::new(gateway, access, WebhookNotifier::new(config.webhooks.clone()))
            .with_max_notifications(config.max_notifications);

        Ok(Self { authenticator, resolver, search, publisher })
    }

    /// In-memory directory (possibly pre-seeded) and in-memory message store.
    pub fn in_memory(config: &RelayConfig, directory: Arc<InMemoryDirectory>) -> anyhow::Result<Self> {
        let documents = InMemoryDocumentStore::new().with_budget(config.search.aggregation_timeout);
        Self::assemble(config, directory, Arc::new(documents))
    }

    /// Postgres directory when `DATABASE_URL` is set, in-memory otherwise.
    pub async fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let Some(url) = config.database_url.as_deref() else {
            tracing::warn!("DATABASE_URL not set; using in-memory directory");
            return Self::in_memory(config, Arc::new(InMemoryDirectory::new()));
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("connect to postgres")?;
        let directory = PostgresDirectory::new(pool);
        directory.ensure_schema().await.context("apply directory schema")?;
        tracing::info!("postgres directory ready");

        let documents = InMemoryDocumentStore::new().with_budget(config.search.aggregation_timeout);
        Self::assemble(config, Arc::new(directory), Arc::new(documents))
    }
}
