//! Process configuration, read once at startup and passed down explicitly.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use relay_auth::TokenConfig;

use crate::webhooks::WebhookConfig;

const DEV_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Budget for one aggregation; exceeded runs surface as `TimedOut`.
    pub aggregation_timeout: Duration,
    pub max_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    /// Postgres url for the directory; `None` selects the in-memory directory.
    pub database_url: Option<String>,
    pub search: SearchConfig,
    pub webhooks: WebhookConfig,
    pub max_notifications: usize,
    pub logging: LoggingConfig,
}

impl RelayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET_KEY").unwrap_or_else(|| DEV_SECRET.to_string());

        Ok(Self {
            server: ServerConfig {
                host: get("RELAY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
                port: parse(&get, "RELAY_PORT", 8080)?,
            },
            auth: AuthConfig {
                jwt_secret,
                access_ttl_minutes: ttl_minutes(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
                refresh_ttl_minutes: ttl_minutes(&get, "REFRESH_TOKEN_EXPIRE_MINUTES", 60 * 24 * 7)?,
            },
            database_url: get("DATABASE_URL"),
            search: SearchConfig {
                aggregation_timeout: Duration::from_millis(parse(&get, "SEARCH_TIMEOUT_MS", 5_000)?),
                max_limit: parse(&get, "SEARCH_MAX_LIMIT", 1_000)?,
            },
            webhooks: WebhookConfig {
                timeout: Duration::from_millis(parse(&get, "WEBHOOK_TIMEOUT_MS", 10_000)?),
                user_agent: get("WEBHOOK_USER_AGENT").unwrap_or_else(|| WebhookConfig::default().user_agent),
            },
            max_notifications: parse(&get, "MAX_NOTIFICATIONS", crate::publisher::MAX_NOTIFICATIONS)?,
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                json: parse(&get, "LOG_JSON", true)?,
            },
        })
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(
            self.auth.jwt_secret.clone(),
            self.auth.access_ttl_minutes,
            self.auth.refresh_ttl_minutes,
        )
    }

    /// True when no `JWT_SECRET_KEY` was supplied.
    pub fn uses_dev_secret(&self) -> bool {
        self.auth.jwt_secret == DEV_SECRET
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

/// Token lifetimes must be positive; anything else issues tokens that are
/// already expired.
fn ttl_minutes(get: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> anyhow::Result<i64> {
    let minutes = parse(get, key, default)?;
    if minutes <= 0 {
        bail!("{key} must be a positive number of minutes, got {minutes}");
    }
    Ok(minutes)
}
