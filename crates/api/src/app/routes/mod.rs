use axum::Router;

pub mod auth;
pub mod messages;
pub mod partners;
pub mod permissions;
pub mod subscriptions;
pub mod system;
pub mod topics;

/// Router for all bearer-protected (partner-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/partners", partners::router())
        .nest("/topics", topics::router())
        .nest("/permissions", permissions::router())
        .nest("/subscriptions", subscriptions::router())
        .nest("/messages", messages::router())
}
