use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use relay_core::{NewTopic, TopicId, TopicPatch};

use crate::app::dto::ListQuery;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PartnerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_topics).post(create_topic))
        .route("/my", get(list_my_topics))
        .route("/:id", get(get_topic).put(edit_topic).delete(delete_topic))
}

/// Visible topics, optionally narrowed to one owner with `?partner_id=`.
pub async fn list_topics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let topics = services
        .resolver
        .list_topics(partner.partner_id(), query.partner_id, query.page())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(topics).into_response())
}

pub async fn list_my_topics(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let topics = services
        .resolver
        .list_my_topics(partner.partner_id(), query.page())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(topics).into_response())
}

pub async fn get_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<TopicId>,
) -> ApiResult {
    let topic = services
        .resolver
        .get_topic(id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(topic).into_response())
}

pub async fn create_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<NewTopic>,
) -> ApiResult {
    let topic = services
        .resolver
        .create_topic(partner.partner_id(), body)
        .await
        .map_err(errors::access_error)?;
    Ok((StatusCode::CREATED, Json(topic)).into_response())
}

pub async fn edit_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<TopicId>,
    Json(body): Json<TopicPatch>,
) -> ApiResult {
    let topic = services
        .resolver
        .edit_topic(id, partner.partner_id(), body)
        .await
        .map_err(errors::access_error)?;
    Ok(Json(topic).into_response())
}

pub async fn delete_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<TopicId>,
) -> ApiResult {
    services
        .resolver
        .delete_topic(id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
