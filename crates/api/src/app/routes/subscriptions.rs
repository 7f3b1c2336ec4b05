use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use relay_core::TopicId;

use crate::app::dto::CreateSubscriptionRequest;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PartnerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_subscription))
        .route("/:id", get(get_subscription).delete(delete_subscription))
        .route("/topic/:topic_id", get(topic_subscriptions))
}

pub async fn create_subscription(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<CreateSubscriptionRequest>,
) -> ApiResult {
    let subscription = services
        .resolver
        .create_subscription(body.topic_id, &body.url, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok((StatusCode::CREATED, Json(subscription)).into_response())
}

// Raw ids: non-positive values are a validation error, not a 404.
pub async fn get_subscription(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<i64>,
) -> ApiResult {
    let subscription = services
        .resolver
        .get_subscription(id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(subscription).into_response())
}

pub async fn delete_subscription(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<i64>,
) -> ApiResult {
    services
        .resolver
        .delete_subscription(id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn topic_subscriptions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(topic_id): Path<TopicId>,
) -> ApiResult {
    let subscriptions = services
        .resolver
        .topic_subscriptions(topic_id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(subscriptions).into_response())
}
