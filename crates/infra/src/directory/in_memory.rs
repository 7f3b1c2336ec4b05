use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use relay_auth::{DirectoryError, DirectoryStore};
use relay_core::{
    Entity, NewTopic, Page, Partner, PartnerId, Permission, PermissionId, Subscription, SubscriptionId, Topic, TopicId,
    UserAccount, UserId,
};

#[derive(Debug, Default)]
struct DirectoryState {
    partners: BTreeMap<PartnerId, Partner>,
    topics: BTreeMap<TopicId, Topic>,
    permissions: BTreeMap<PermissionId, Permission>,
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    users: BTreeMap<UserId, UserAccount>,
    next_id: i64,
}

impl DirectoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_visible(&self, topic: &Topic, partner: PartnerId) -> bool {
        topic.is_owned_by(partner)
            || self
                .permissions
                .values()
                .any(|p| p.topic_id == topic.id && p.partner_id == partner)
    }
}

/// Store `record` under its own id and hand back a copy.
fn put<E: Entity + Clone>(table: &mut BTreeMap<E::Id, E>, record: E) -> E {
    table.insert(record.id(), record.clone());
    record
}

/// In-memory directory for tests and single-process dev runs.
///
/// Ids come from one shared counter, so ids are unique across tables.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, DirectoryState>, DirectoryError> {
        self.inner
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, DirectoryState>, DirectoryError> {
        self.inner
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".into()))
    }

    // ───── Seeding (administrative flows live outside the relay) ─────

    pub fn add_partner(&self, name: &str, description: Option<&str>) -> Result<Partner, DirectoryError> {
        let mut state = self.write()?;
        let partner = Partner {
            id: PartnerId::new(state.next_id()),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        Ok(put(&mut state.partners, partner))
    }

    pub fn add_user(
        &self,
        username: &str,
        email: &str,
        partner_id: PartnerId,
        password_hash: String,
    ) -> Result<UserAccount, DirectoryError> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.username == username) {
            return Err(DirectoryError::Conflict(format!("username '{username}' taken")));
        }
        let account = UserAccount {
            id: UserId::new(state.next_id()),
            username: username.to_string(),
            email: email.to_string(),
            partner_id,
            password_hash,
        };
        Ok(put(&mut state.users, account))
    }

    pub fn permission_count(&self) -> usize {
        self.read().map(|s| s.permissions.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn find_partner(&self, id: PartnerId) -> Result<Option<Partner>, DirectoryError> {
        Ok(self.read()?.partners.get(&id).cloned())
    }

    async fn list_partners(&self, page: Page) -> Result<Vec<Partner>, DirectoryError> {
        Ok(page.slice(self.read()?.partners.values().cloned()))
    }

    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, DirectoryError> {
        Ok(self.read()?.topics.get(&id).cloned())
    }

    async fn list_visible_topics(
        &self,
        partner: PartnerId,
        owner: Option<PartnerId>,
        page: Page,
    ) -> Result<Vec<Topic>, DirectoryError> {
        let state = self.read()?;
        let visible = state
            .topics
            .values()
            .filter(|t| owner.is_none_or(|o| t.partner_id == o))
            .filter(|t| state.is_visible(t, partner))
            .cloned();
        Ok(page.slice(visible))
    }

    async fn visible_topic_ids(&self, partner: PartnerId) -> Result<Vec<TopicId>, DirectoryError> {
        let state = self.read()?;
        Ok(state
            .topics
            .values()
            .filter(|t| state.is_visible(t, partner))
            .map(|t| t.id)
            .collect())
    }

    async fn insert_topic(&self, owner: PartnerId, topic: NewTopic) -> Result<Topic, DirectoryError> {
        let mut state = self.write()?;
        let topic = Topic {
            id: TopicId::new(state.next_id()),
            name: topic.name,
            description: topic.description,
            partner_id: owner,
            json_template: topic.json_template,
        };
        Ok(put(&mut state.topics, topic))
    }

    async fn update_topic(&self, topic: &Topic) -> Result<(), DirectoryError> {
        let mut state = self.write()?;
        match state.topics.get_mut(&topic.id) {
            Some(slot) => {
                *slot = topic.clone();
                Ok(())
            }
            None => Err(DirectoryError::Unavailable(format!("topic {} vanished during update", topic.id))),
        }
    }

    async fn delete_topic(&self, id: TopicId) -> Result<bool, DirectoryError> {
        let mut state = self.write()?;
        if state.topics.remove(&id).is_none() {
            return Ok(false);
        }
        state.permissions.retain(|_, p| p.topic_id != id);
        state.subscriptions.retain(|_, s| s.topic_id != id);
        Ok(true)
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, DirectoryError> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    async fn find_permission_for(
        &self,
        topic: TopicId,
        partner: PartnerId,
    ) -> Result<Option<Permission>, DirectoryError> {
        Ok(self
            .read()?
            .permissions
            .values()
            .find(|p| p.topic_id == topic && p.partner_id == partner)
            .cloned())
    }

    async fn list_partner_permissions(&self, partner: PartnerId, page: Page) -> Result<Vec<Permission>, DirectoryError> {
        let state = self.read()?;
        Ok(page.slice(state.permissions.values().filter(|p| p.partner_id == partner).cloned()))
    }

    async fn list_topic_permissions(&self, topic: TopicId) -> Result<Vec<Permission>, DirectoryError> {
        let state = self.read()?;
        Ok(state.permissions.values().filter(|p| p.topic_id == topic).cloned().collect())
    }

    async fn insert_permission(&self, topic: TopicId, partner: PartnerId) -> Result<Permission, DirectoryError> {
        let mut state = self.write()?;
        if state
            .permissions
            .values()
            .any(|p| p.topic_id == topic && p.partner_id == partner)
        {
            return Err(DirectoryError::Conflict(format!("permission ({topic}, {partner}) exists")));
        }
        let permission = Permission {
            id: PermissionId::new(state.next_id()),
            topic_id: topic,
            partner_id: partner,
        };
        Ok(put(&mut state.permissions, permission))
    }

    async fn revoke_permission(&self, id: PermissionId) -> Result<Option<u64>, DirectoryError> {
        let mut state = self.write()?;
        let Some(grant) = state.permissions.remove(&id) else {
            return Ok(None);
        };
        let before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|_, s| !(s.topic_id == grant.topic_id && s.partner_id == grant.partner_id));
        Ok(Some((before - state.subscriptions.len()) as u64))
    }

    async fn find_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, DirectoryError> {
        Ok(self.read()?.subscriptions.get(&id).cloned())
    }

    async fn list_topic_subscriptions(&self, topic: TopicId) -> Result<Vec<Subscription>, DirectoryError> {
        let state = self.read()?;
        Ok(state.subscriptions.values().filter(|s| s.topic_id == topic).cloned().collect())
    }

    async fn insert_subscription(
        &self,
        topic: TopicId,
        partner: PartnerId,
        url: &str,
    ) -> Result<Subscription, DirectoryError> {
        let mut state = self.write()?;
        let sub = Subscription {
            id: SubscriptionId::new(state.next_id()),
            url: url.to_string(),
            topic_id: topic,
            partner_id: partner,
        };
        Ok(put(&mut state.subscriptions, sub))
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<bool, DirectoryError> {
        Ok(self.write()?.subscriptions.remove(&id).is_some())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        Ok(self.read()?.users.values().find(|u| u.username == username).cloned())
    }
}
