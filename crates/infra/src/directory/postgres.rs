//! Postgres-backed directory.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | DirectoryError |
//! |------------|----------------------|----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any | `Unavailable` |
//! | Decode / ColumnNotFound | N/A | `Corrupt` |
//! | PoolClosed, Io, other | N/A | `Unavailable` |

use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use relay_auth::{DirectoryError, DirectoryStore};
use relay_core::{
    NewTopic, Page, Partner, PartnerId, Permission, PermissionId, Subscription, SubscriptionId, Topic, TopicId,
    UserAccount, UserId,
};

/// Tables the directory reads. Applied by [`PostgresDirectory::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partners (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS topics (
    id            BIGSERIAL PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT,
    partner_id    BIGINT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    json_template TEXT
);
CREATE TABLE IF NOT EXISTS permissions (
    id         BIGSERIAL PRIMARY KEY,
    topic_id   BIGINT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    partner_id BIGINT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    UNIQUE (topic_id, partner_id)
);
CREATE TABLE IF NOT EXISTS subscriptions (
    id         BIGSERIAL PRIMARY KEY,
    url        TEXT NOT NULL,
    topic_id   BIGINT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
    partner_id BIGINT NOT NULL REFERENCES partners(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS users (
    id              BIGSERIAL PRIMARY KEY,
    username        TEXT NOT NULL UNIQUE,
    email           TEXT NOT NULL,
    partner_id      BIGINT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    hashed_password TEXT NOT NULL
);
"#;

const TOPIC_COLUMNS: &str = "t.id, t.name, t.description, t.partner_id, t.json_template";

#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), DirectoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DirectoryStore for PostgresDirectory {
    #[instrument(skip(self), fields(partner_id = %id), err)]
    async fn find_partner(&self, id: PartnerId) -> Result<Option<Partner>, DirectoryError> {
        let row = sqlx::query("SELECT id, name, description FROM partners WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_partner", e))?;
        row.as_ref().map(partner_from_row).transpose()
    }

    async fn list_partners(&self, page: Page) -> Result<Vec<Partner>, DirectoryError> {
        let rows = sqlx::query("SELECT id, name, description FROM partners ORDER BY id LIMIT $1 OFFSET $2")
            .bind(page.limit as i64)
            .bind(page.skip as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_partners", e))?;
        rows.iter().map(partner_from_row).collect()
    }

    #[instrument(skip(self), fields(topic_id = %id), err)]
    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, DirectoryError> {
        let row = sqlx::query(&format!("SELECT {TOPIC_COLUMNS} FROM topics t WHERE t.id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_topic", e))?;
        row.as_ref().map(topic_from_row).transpose()
    }

    #[instrument(skip(self), fields(partner_id = %partner), err)]
    async fn list_visible_topics(
        &self,
        partner: PartnerId,
        owner: Option<PartnerId>,
        page: Page,
    ) -> Result<Vec<Topic>, DirectoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TOPIC_COLUMNS}
            FROM topics t
            WHERE (t.partner_id = $1
                   OR EXISTS (SELECT 1 FROM permissions p WHERE p.topic_id = t.id AND p.partner_id = $1))
              AND ($2::bigint IS NULL OR t.partner_id = $2)
            ORDER BY t.id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(partner.get())
        .bind(owner.map(|o| o.get()))
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_visible_topics", e))?;
        rows.iter().map(topic_from_row).collect()
    }

    #[instrument(skip(self), fields(partner_id = %partner), err)]
    async fn visible_topic_ids(&self, partner: PartnerId) -> Result<Vec<TopicId>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM topics WHERE partner_id = $1
            UNION
            SELECT topic_id AS id FROM permissions WHERE partner_id = $1
            ORDER BY id
            "#,
        )
        .bind(partner.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("visible_topic_ids", e))?;
        rows.iter()
            .map(|row| column::<i64>(row, "id").map(TopicId::new))
            .collect()
    }

    #[instrument(skip(self, topic), fields(partner_id = %owner), err)]
    async fn insert_topic(&self, owner: PartnerId, topic: NewTopic) -> Result<Topic, DirectoryError> {
        let row = sqlx::query(
            r#"
            INSERT INTO topics (name, description, partner_id, json_template)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, description, partner_id, json_template
            "#,
        )
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(owner.get())
        .bind(&topic.json_template)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_topic", e))?;
        topic_from_row(&row)
    }

    async fn update_topic(&self, topic: &Topic) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE topics SET name = $2, description = $3, json_template = $4 WHERE id = $1")
            .bind(topic.id.get())
            .bind(&topic.name)
            .bind(&topic.description)
            .bind(&topic.json_template)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_topic", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(topic_id = %id), err)]
    async fn delete_topic(&self, id: TopicId) -> Result<bool, DirectoryError> {
        // Permissions and subscriptions cascade through their foreign keys.
        let result = sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_topic", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Option<Permission>, DirectoryError> {
        let row = sqlx::query("SELECT id, topic_id, partner_id FROM permissions WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_permission", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self), fields(topic_id = %topic, partner_id = %partner), err)]
    async fn find_permission_for(
        &self,
        topic: TopicId,
        partner: PartnerId,
    ) -> Result<Option<Permission>, DirectoryError> {
        let row = sqlx::query("SELECT id, topic_id, partner_id FROM permissions WHERE topic_id = $1 AND partner_id = $2")
            .bind(topic.get())
            .bind(partner.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_permission_for", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    async fn list_partner_permissions(&self, partner: PartnerId, page: Page) -> Result<Vec<Permission>, DirectoryError> {
        let rows = sqlx::query(
            "SELECT id, topic_id, partner_id FROM permissions WHERE partner_id = $1 ORDER BY id LIMIT $2 OFFSET $3",
        )
        .bind(partner.get())
        .bind(page.limit as i64)
        .bind(page.skip as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_partner_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    async fn list_topic_permissions(&self, topic: TopicId) -> Result<Vec<Permission>, DirectoryError> {
        let rows = sqlx::query("SELECT id, topic_id, partner_id FROM permissions WHERE topic_id = $1 ORDER BY id")
            .bind(topic.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_topic_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip(self), fields(topic_id = %topic, partner_id = %partner), err)]
    async fn insert_permission(&self, topic: TopicId, partner: PartnerId) -> Result<Permission, DirectoryError> {
        let row = sqlx::query(
            "INSERT INTO permissions (topic_id, partner_id) VALUES ($1, $2) RETURNING id, topic_id, partner_id",
        )
        .bind(topic.get())
        .bind(partner.get())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        permission_from_row(&row)
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn revoke_permission(&self, id: PermissionId) -> Result<Option<u64>, DirectoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(row) = sqlx::query("DELETE FROM permissions WHERE id = $1 RETURNING id, topic_id, partner_id")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("revoke_permission", e))?
        else {
            return Ok(None);
        };
        let grant = permission_from_row(&row)?;

        let dropped = sqlx::query("DELETE FROM subscriptions WHERE topic_id = $1 AND partner_id = $2")
            .bind(grant.topic_id.get())
            .bind(grant.partner_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("revoke_permission", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(Some(dropped.rows_affected()))
    }

    async fn find_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>, DirectoryError> {
        let row = sqlx::query("SELECT id, url, topic_id, partner_id FROM subscriptions WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_subscription", e))?;
        row.as_ref().map(subscription_from_row).transpose()
    }

    #[instrument(skip(self), fields(topic_id = %topic), err)]
    async fn list_topic_subscriptions(&self, topic: TopicId) -> Result<Vec<Subscription>, DirectoryError> {
        let rows = sqlx::query("SELECT id, url, topic_id, partner_id FROM subscriptions WHERE topic_id = $1 ORDER BY id")
            .bind(topic.get())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_topic_subscriptions", e))?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn insert_subscription(
        &self,
        topic: TopicId,
        partner: PartnerId,
        url: &str,
    ) -> Result<Subscription, DirectoryError> {
        let row = sqlx::query(
            "INSERT INTO subscriptions (url, topic_id, partner_id) VALUES ($1, $2, $3) RETURNING id, url, topic_id, partner_id",
        )
        .bind(url)
        .bind(topic.get())
        .bind(partner.get())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_subscription", e))?;
        subscription_from_row(&row)
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> Result<bool, DirectoryError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_subscription", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        let row = sqlx::query("SELECT id, username, email, partner_id, hashed_password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }
}

// ───── Row mapping ─────

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DirectoryError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DirectoryError::Corrupt(format!("column {name}: {e}")))
}

fn partner_from_row(row: &PgRow) -> Result<Partner, DirectoryError> {
    Ok(Partner {
        id: PartnerId::new(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
    })
}

fn topic_from_row(row: &PgRow) -> Result<Topic, DirectoryError> {
    Ok(Topic {
        id: TopicId::new(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        partner_id: PartnerId::new(column(row, "partner_id")?),
        json_template: column(row, "json_template")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, DirectoryError> {
    Ok(Permission {
        id: PermissionId::new(column(row, "id")?),
        topic_id: TopicId::new(column(row, "topic_id")?),
        partner_id: PartnerId::new(column(row, "partner_id")?),
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription, DirectoryError> {
    Ok(Subscription {
        id: SubscriptionId::new(column(row, "id")?),
        url: column(row, "url")?,
        topic_id: TopicId::new(column(row, "topic_id")?),
        partner_id: PartnerId::new(column(row, "partner_id")?),
    })
}

fn user_from_row(row: &PgRow) -> Result<UserAccount, DirectoryError> {
    Ok(UserAccount {
        id: UserId::new(column(row, "id")?),
        username: column(row, "username")?,
        email: column(row, "email")?,
        partner_id: PartnerId::new(column(row, "partner_id")?),
        password_hash: column(row, "hashed_password")?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DirectoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DirectoryError::Conflict(msg),
                _ => DirectoryError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            DirectoryError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => DirectoryError::Unavailable(format!("connection pool closed in {}", operation)),
        other => DirectoryError::Unavailable(format!("sqlx error in {}: {}", operation, other)),
    }
}

#[cfg(test)]
mod tests {
    //! Run with `DATABASE_URL` pointing at a disposable database:
    //! `cargo test -p relay-infra -- --ignored`. Tables are truncated first.

    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn directory() -> Option<PostgresDirectory> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("skipping postgres directory tests: DATABASE_URL is not set");
            return None;
        };
        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
        let dir = PostgresDirectory::new(pool);
        dir.ensure_schema().await.unwrap();
        sqlx::query("TRUNCATE users, subscriptions, permissions, topics, partners RESTART IDENTITY CASCADE")
            .execute(&*dir.pool)
            .await
            .unwrap();
        Some(dir)
    }

    async fn partner(dir: &PostgresDirectory, name: &str) -> PartnerId {
        let id: i64 = sqlx::query_scalar("INSERT INTO partners (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&*dir.pool)
            .await
            .unwrap();
        PartnerId::new(id)
    }

    fn draft(name: &str) -> NewTopic {
        NewTopic { name: name.into(), description: None, json_template: None }
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn schema_is_idempotent_and_grants_are_unique() {
        let Some(dir) = directory().await else { return };
        dir.ensure_schema().await.unwrap();

        let a = partner(&dir, "A").await;
        let b = partner(&dir, "B").await;
        let t = dir.insert_topic(a, draft("orders")).await.unwrap();

        dir.insert_permission(t.id, b).await.unwrap();
        assert!(matches!(dir.insert_permission(t.id, b).await, Err(DirectoryError::Conflict(_))));
        assert_eq!(dir.visible_topic_ids(b).await.unwrap(), vec![t.id]);
    }

    #[tokio::test]
    #[ignore = "needs a Postgres database in DATABASE_URL"]
    async fn revoke_and_topic_delete_cascade() {
        let Some(dir) = directory().await else { return };
        let a = partner(&dir, "A").await;
        let b = partner(&dir, "B").await;
        let t = dir.insert_topic(a, draft("orders")).await.unwrap();
        let grant = dir.insert_permission(t.id, b).await.unwrap();
        dir.insert_subscription(t.id, b, "http://b.example/1").await.unwrap();
        dir.insert_subscription(t.id, b, "http://b.example/2").await.unwrap();
        dir.insert_subscription(t.id, a, "http://a.example/hook").await.unwrap();

        assert_eq!(dir.revoke_permission(grant.id).await.unwrap(), Some(2));
        assert_eq!(dir.revoke_permission(grant.id).await.unwrap(), None);
        let left = dir.list_topic_subscriptions(t.id).await.unwrap();
        assert_eq!(left.iter().map(|s| s.partner_id).collect::<Vec<_>>(), vec![a]);

        dir.insert_permission(t.id, b).await.unwrap();
        assert!(dir.delete_topic(t.id).await.unwrap());
        assert!(dir.list_topic_permissions(t.id).await.unwrap().is_empty());
        assert!(dir.list_topic_subscriptions(t.id).await.unwrap().is_empty());
    }
}
