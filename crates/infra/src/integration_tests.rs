//! Integration tests across the directory, resolver and message pipelines.
//!
//! Verifies:
//! - login, refresh and bearer authentication against stored accounts
//! - topic access rules for owners, grantees and strangers
//! - permission and subscription management, including cascading revoke
//! - search never returns messages from topics outside the caller's scope

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use relay_auth::{
        AccessError, Authenticator, AuthorizationResolver, DirectoryError, DirectoryStore, LiveTopicAccess, LoginError,
        PasswordHasher, TokenConfig, TokenError, TokenKind, TokenService, TopicAccess,
    };
    use relay_core::{
        DomainError, NewTopic, Page, Partner, PartnerId, Permission, PermissionId, Subscription, SubscriptionId, Topic,
        TopicId, TopicPatch, UserAccount,
    };

    use crate::directory::InMemoryDirectory;
    use crate::document_store::InMemoryDocumentStore;
    use crate::messages::MessageStoreGateway;
    use crate::publisher::{MessagePublisher, SendRequest};
    use crate::search::{SearchEngine, SearchError, SearchPipelineBuilder, SearchRequest};
    use crate::webhooks::WebhookNotifier;

    struct World {
        directory: Arc<InMemoryDirectory>,
        resolver: Arc<AuthorizationResolver>,
        store: Arc<InMemoryDocumentStore>,
        search: SearchEngine,
        publisher: MessagePublisher,
        a: Partner,
        b: Partner,
        c: Partner,
    }

    fn setup() -> World {
        let directory = Arc::new(InMemoryDirectory::new());
        let a = directory.add_partner("A", Some("publisher")).unwrap();
        let b = directory.add_partner("B", None).unwrap();
        let c = directory.add_partner("C", None).unwrap();

        let resolver = Arc::new(AuthorizationResolver::new(directory.clone()));
        let access: Arc<dyn TopicAccess> = Arc::new(LiveTopicAccess::new(resolver.clone()));
        let store = Arc::new(InMemoryDocumentStore::new());
        let gateway = MessageStoreGateway::new(store.clone());

        World {
            search: SearchEngine::new(gateway.clone(), access.clone(), SearchPipelineBuilder::default()),
            publisher: MessagePublisher::new(gateway, access, WebhookNotifier::default()),
            directory,
            resolver,
            store,
            a,
            b,
            c,
        }
    }

    async fn topic(world: &World, owner: PartnerId, name: &str) -> Topic {
        world
            .resolver
            .create_topic(owner, NewTopic { name: name.into(), description: None, json_template: None })
            .await
            .unwrap()
    }

    async fn publish(world: &World, partner: PartnerId, topic_id: TopicId, unique_id: i64) {
        world
            .publisher
            .send(
                partner,
                SendRequest { topic_id, unique_id: Some(unique_id), payload: json!({"n": unique_id}), is_notify: false },
            )
            .await
            .unwrap();
    }

    // ───── Access checks ─────

    #[tokio::test]
    async fn owner_and_grantee_pass_strangers_are_forbidden() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();

        assert!(w.resolver.assert_can_access_topic(t.id, w.a.id).await.is_ok());
        assert!(w.resolver.assert_can_access_topic(t.id, w.b.id).await.is_ok());
        assert_eq!(
            w.resolver.assert_can_access_topic(t.id, w.c.id).await,
            Err(AccessError::Forbidden)
        );
        assert_eq!(
            w.resolver.assert_can_access_topic(TopicId::new(9_999), w.a.id).await,
            Err(AccessError::TopicNotFound)
        );
    }

    #[tokio::test]
    async fn accessible_topics_are_owned_plus_granted() {
        let w = setup();
        let own = topic(&w, w.b.id, "b-own").await;
        let granted = topic(&w, w.a.id, "a-shared").await;
        let _private = topic(&w, w.a.id, "a-private").await;
        w.resolver.create_permission(granted.id, w.b.id, w.a.id).await.unwrap();

        let ids = w.resolver.list_accessible_topics(w.b.id).await.unwrap();
        assert_eq!(ids, vec![own.id, granted.id]);
    }

    // ───── Permissions ─────

    #[tokio::test]
    async fn duplicate_grant_is_rejected_without_new_row() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();

        let second = w.resolver.create_permission(t.id, w.b.id, w.a.id).await;
        assert_eq!(second, Err(AccessError::PermissionAlreadyExists));
        assert_eq!(w.directory.permission_count(), 1);
    }

    #[tokio::test]
    async fn grant_checks_run_in_order() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;

        assert_eq!(
            w.resolver.create_permission(t.id, PartnerId::new(4_242), w.a.id).await,
            Err(AccessError::PartnerNotFound)
        );
        assert_eq!(
            w.resolver.create_permission(t.id, w.c.id, w.b.id).await,
            Err(AccessError::Forbidden)
        );
        assert_eq!(
            w.resolver.create_permission(TopicId::new(4_242), w.c.id, w.a.id).await,
            Err(AccessError::TopicNotFound)
        );
        assert_eq!(w.directory.permission_count(), 0);
    }

    #[tokio::test]
    async fn revoking_a_grant_drops_the_grantees_subscriptions() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        let grant = w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();
        w.resolver.create_subscription(t.id, "http://b.example/hook", w.b.id).await.unwrap();
        w.resolver.create_subscription(t.id, "http://a.example/hook", w.a.id).await.unwrap();

        w.resolver.delete_permission(grant.id, w.a.id).await.unwrap();

        assert_eq!(w.resolver.subscriber_urls(t.id).await.unwrap(), vec!["http://a.example/hook"]);
        assert_eq!(
            w.resolver.assert_can_access_topic(t.id, w.b.id).await,
            Err(AccessError::Forbidden)
        );
    }

    /// Delegates to an in-memory directory but cannot revoke.
    struct RevokeOutage(Arc<InMemoryDirectory>);

    #[async_trait::async_trait]
    impl DirectoryStore for RevokeOutage {
        async fn find_partner(&self, id: PartnerId) -> Result<Option<Partner>, DirectoryError> {
            self.0.find_partner(id).await
        }
        async fn list_partners(&self, page: Page) -> Result<Vec<Partner>, DirectoryError> {
            self.0.list_partners(page).await
        }
        async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, DirectoryError> {
            self.0.find_topic(id).await
        }
        async fn list_visible_topics(
            &self,
            partner: PartnerId,
            owner: Option<PartnerId>,
            page: Page,
        ) -> Result<Vec<Topic>, DirectoryError> {
            self.0.list_visible_topics(partner, owner, page).await
        }
        async fn visible_topic_ids(&self, partner: PartnerId) -> Result<Vec<TopicId>, DirectoryError> {
            self.0.visible_topic_ids(partner).await
        }
        async fn insert_topic(&self, owner: PartnerId, topic: NewTopic) -> Result<Topic, DirectoryError> {
            self.0.insert_topic(owner, topic).await
        }
        async fn update_topic(&self, topic: &Topic) -> Result<(), DirectoryError> {
            self.0.update_topic(topic).await
        }
        async fn delete_topic(&self, id: TopicId) -> Result<bool, DirectoryError> {
            self.0.delete_topic(id).await
        }
        async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, DirectoryError> {
            self.0.find_permission(id).await
        }
        async fn find_permission_for(
            &self,
            topic: TopicId,
            partner: PartnerId,
        ) -> Result<Option<Permission>, DirectoryError> {
            self.0.find_permission_for(topic, partner).await
        }
        async fn list_partner_permissions(&self, partner: PartnerId, page: Page) -> Result<Vec<Permission>, DirectoryError> {
            self.0.list_partner_permissions(partner, page).await
        }
        async fn list_topic_permissions(&self, topic: TopicId) -> Result<Vec<Permission>, DirectoryError> {
            self.0.list_topic_permissions(topic).await
        }
        async fn insert_permission(&self, topic: TopicId, partner: PartnerId) -> Result<Permission, DirectoryError> {
            self.0.insert_permission(topic, partner).await
        }
        async fn revoke_permission(&self, _id: PermissionId) -> Result<Option<u64>, DirectoryError> {
            Err(DirectoryError::Unavailable("connection reset".into()))
        }
        async fn find_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, DirectoryError> {
            self.0.find_subscription(id).await
        }
        async fn list_topic_subscriptions(&self, topic: TopicId) -> Result<Vec<Subscription>, DirectoryError> {
            self.0.list_topic_subscriptions(topic).await
        }
        async fn insert_subscription(
            &self,
            topic: TopicId,
            partner: PartnerId,
            url: &str,
        ) -> Result<Subscription, DirectoryError> {
            self.0.insert_subscription(topic, partner, url).await
        }
        async fn delete_subscription(&self, id: SubscriptionId) -> Result<bool, DirectoryError> {
            self.0.delete_subscription(id).await
        }
        async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
            self.0.find_user_by_username(username).await
        }
    }

    #[tokio::test]
    async fn failed_revoke_leaves_grant_and_subscriptions_together() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        let grant = w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();
        w.resolver.create_subscription(t.id, "http://b.example/hook", w.b.id).await.unwrap();

        let flaky = AuthorizationResolver::new(Arc::new(RevokeOutage(w.directory.clone())));
        assert!(matches!(
            flaky.delete_permission(grant.id, w.a.id).await,
            Err(AccessError::Directory(DirectoryError::Unavailable(_)))
        ));
        assert!(matches!(
            flaky.delete_permission_for(w.b.id, t.id, w.a.id).await,
            Err(AccessError::Directory(_))
        ));

        // Either both halves of the revoke happen or neither does.
        assert_eq!(w.directory.permission_count(), 1);
        assert!(w.resolver.check_permission(t.id, w.b.id).await.unwrap());
        assert_eq!(w.resolver.subscriber_urls(t.id).await.unwrap(), vec!["http://b.example/hook"]);

        w.resolver.delete_permission(grant.id, w.a.id).await.unwrap();
        assert_eq!(w.directory.permission_count(), 0);
        assert!(w.resolver.subscriber_urls(t.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_grant_is_not_found() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        assert_eq!(
            w.resolver.delete_permission_for(w.b.id, t.id, w.a.id).await,
            Err(AccessError::PermissionNotFound)
        );
        assert_eq!(
            w.resolver.delete_permission(relay_core::PermissionId::new(77), w.a.id).await,
            Err(AccessError::PermissionNotFound)
        );
    }

    #[tokio::test]
    async fn grantee_sees_only_its_own_grant() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();
        w.resolver.create_permission(t.id, w.c.id, w.a.id).await.unwrap();

        assert_eq!(w.resolver.permissions_for_topic(t.id, w.a.id).await.unwrap().len(), 2);
        let seen_by_b = w.resolver.permissions_for_topic(t.id, w.b.id).await.unwrap();
        assert_eq!(seen_by_b.len(), 1);
        assert_eq!(seen_by_b[0].partner_id, w.b.id);
        assert!(w.resolver.check_permission(t.id, w.c.id).await.unwrap());
    }

    // ───── Topics ─────

    #[tokio::test]
    async fn only_owner_edits_or_deletes() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        w.resolver.create_permission(t.id, w.b.id, w.a.id).await.unwrap();

        let patch = TopicPatch { description: Some("all orders".into()), ..Default::default() };
        assert_eq!(
            w.resolver.edit_topic(t.id, w.b.id, patch.clone()).await,
            Err(AccessError::Forbidden)
        );
        let edited = w.resolver.edit_topic(t.id, w.a.id, patch).await.unwrap();
        assert_eq!(edited.description.as_deref(), Some("all orders"));

        assert_eq!(w.resolver.delete_topic(t.id, w.b.id).await, Err(AccessError::Forbidden));
        w.resolver.delete_topic(t.id, w.a.id).await.unwrap();
        assert_eq!(w.resolver.get_topic(t.id, w.a.id).await, Err(AccessError::TopicNotFound));
    }

    #[tokio::test]
    async fn invisible_topic_reads_as_not_found() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        assert_eq!(w.resolver.get_topic(t.id, w.c.id).await, Err(AccessError::TopicNotFound));
        assert!(w.resolver.list_topics(w.c.id, None, Page::default()).await.unwrap().is_empty());
        assert_eq!(w.resolver.list_my_topics(w.a.id, Page::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_topic_name_is_rejected() {
        let w = setup();
        let res = w
            .resolver
            .create_topic(w.a.id, NewTopic { name: " ".into(), description: None, json_template: None })
            .await;
        assert!(matches!(res, Err(AccessError::Validation(DomainError::Validation(_)))));
    }

    // ───── Subscriptions ─────

    #[tokio::test]
    async fn subscriptions_are_private_and_need_access() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;

        assert_eq!(
            w.resolver.create_subscription(t.id, "http://c.example/hook", w.c.id).await,
            Err(AccessError::Forbidden)
        );

        let sub = w.resolver.create_subscription(t.id, "http://a.example/hook", w.a.id).await.unwrap();
        assert_eq!(
            w.resolver.get_subscription(sub.id.get(), w.c.id).await,
            Err(AccessError::SubscriptionNotFound)
        );
        assert!(matches!(
            w.resolver.get_subscription(0, w.a.id).await,
            Err(AccessError::Validation(_))
        ));
        w.resolver.delete_subscription(sub.id.get(), w.a.id).await.unwrap();
        assert!(w.resolver.topic_subscriptions(t.id, w.a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscription_url_is_validated() {
        let w = setup();
        let t = topic(&w, w.a.id, "orders").await;
        assert!(matches!(
            w.resolver.create_subscription(t.id, "not a url", w.a.id).await,
            Err(AccessError::Validation(_))
        ));
    }

    // ───── Search ─────

    #[tokio::test]
    async fn default_scope_is_the_accessible_set() {
        let w = setup();
        let ta = topic(&w, w.a.id, "a").await;
        let tb = topic(&w, w.b.id, "b").await;
        publish(&w, w.a.id, ta.id, 1).await;
        publish(&w, w.b.id, tb.id, 2).await;

        let out = w.search.search(w.a.id, &SearchRequest::default()).await.unwrap();
        assert_eq!(out.unique_ids, vec![1]);
        assert!(out.messages.iter().all(|m| m.topic_id == ta.id));
    }

    #[tokio::test]
    async fn stranger_searching_a_foreign_topic_gets_nothing() {
        let w = setup();
        let t = topic(&w, w.a.id, "secret").await;
        publish(&w, w.a.id, t.id, 1).await;

        let req = SearchRequest { topic_ids: Some(vec![t.id]), ..Default::default() };
        let err = w.search.search(w.b.id, &req).await.unwrap_err();
        assert_eq!(err, SearchError::Access(AccessError::Forbidden));

        // Widening through `match` does not help either.
        let req: SearchRequest = serde_json::from_value(json!({"match": {"topic_id": t.id}})).unwrap();
        let out = w.search.search(w.b.id, &req).await.unwrap();
        assert!(out.messages.is_empty());
    }

    #[tokio::test]
    async fn mixed_scope_is_narrowed() {
        let w = setup();
        let mine = topic(&w, w.b.id, "mine").await;
        let foreign = topic(&w, w.a.id, "foreign").await;
        publish(&w, w.b.id, mine.id, 5).await;
        publish(&w, w.a.id, foreign.id, 6).await;

        let req = SearchRequest { topic_ids: Some(vec![mine.id, foreign.id]), ..Default::default() };
        let out = w.search.search(w.b.id, &req).await.unwrap();
        assert_eq!(out.unique_ids, vec![5]);
    }

    #[tokio::test]
    async fn where_operator_never_reaches_the_store() {
        let w = setup();
        let t = topic(&w, w.a.id, "a").await;
        publish(&w, w.a.id, t.id, 1).await;

        let req: SearchRequest =
            serde_json::from_value(json!({"match": {"$where": "function() { return true }"}})).unwrap();
        let err = w.search.search(w.a.id, &req).await.unwrap_err();
        assert_eq!(err, SearchError::ForbiddenOperator { field: "match" });
        assert_eq!(w.store.aggregation_count(), 0);
    }

    #[tokio::test]
    async fn filters_sort_and_limit_apply_within_scope() {
        let w = setup();
        let t = topic(&w, w.a.id, "a").await;
        for n in 1..=5 {
            publish(&w, w.a.id, t.id, n).await;
        }
        let req: SearchRequest = serde_json::from_value(json!({
            "match": {"payload.n": {"$gte": 2}},
            "sort": {"payload.n": -1},
            "limit": 2
        }))
        .unwrap();
        let out = w.search.search(w.a.id, &req).await.unwrap();
        let ns: Vec<_> = out.messages.iter().map(|m| m.payload["n"].clone()).collect();
        assert_eq!(ns, vec![json!(5), json!(4)]);
        assert_eq!(out.unique_ids, vec![4, 5]);
    }

    #[tokio::test]
    async fn empty_result_has_the_same_shape() {
        let w = setup();
        topic(&w, w.a.id, "quiet").await;
        let out = w.search.search(w.a.id, &SearchRequest::default()).await.unwrap();
        assert!(out.messages.is_empty());
        assert!(out.unique_ids.is_empty());
    }

    // ───── Accounts ─────

    fn authenticator(directory: Arc<InMemoryDirectory>) -> (Authenticator, Arc<TokenService>) {
        let tokens = Arc::new(TokenService::new(TokenConfig::new("integration-secret", 30, 60)));
        let hasher = PasswordHasher::with_params(1024, 1, 1).unwrap();
        (Authenticator::new(tokens.clone(), directory, hasher), tokens)
    }

    fn seed_user(w: &World, username: &str, password: &str) {
        let hash = PasswordHasher::with_params(1024, 1, 1).unwrap().hash(password).unwrap();
        w.directory.add_user(username, "u@example.com", w.a.id, hash).unwrap();
    }

    #[tokio::test]
    async fn login_then_authenticate_binds_the_partner() {
        let w = setup();
        seed_user(&w, "alice", "s3cret");
        let (auth, _) = authenticator(w.directory.clone());

        let pair = auth.login("alice", "s3cret").await.unwrap();
        let principal = auth.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.partner_id, w.a.id);

        // Refresh tokens do not authenticate requests.
        assert!(matches!(
            auth.authenticate(&pair.refresh_token).await,
            Err(LoginError::Token(TokenError::Invalid(_)))
        ));

        let access = auth.refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(auth.authenticate(&access).await.unwrap().id, principal.id);
    }

    #[tokio::test]
    async fn bad_credentials_are_refused() {
        let w = setup();
        seed_user(&w, "alice", "s3cret");
        let (auth, _) = authenticator(w.directory.clone());

        assert!(matches!(auth.login("alice", "nope").await, Err(LoginError::WrongPassword)));
        assert!(matches!(auth.login("bob", "s3cret").await, Err(LoginError::UnknownUser)));
    }

    #[tokio::test]
    async fn tokens_for_unknown_subjects_are_refused() {
        let w = setup();
        let (auth, tokens) = authenticator(w.directory.clone());

        let access = tokens.issue("ghost", TokenKind::Access).unwrap();
        let refresh = tokens.issue("ghost", TokenKind::Refresh).unwrap();
        assert!(matches!(auth.authenticate(&access).await, Err(LoginError::Token(_))));
        assert!(matches!(auth.refresh(&refresh).await, Err(LoginError::Token(_))));
    }
}
