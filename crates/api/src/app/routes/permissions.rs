use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use relay_auth::AccessError;
use relay_core::{PermissionId, TopicId};

use crate::app::dto::{CheckResponse, CreatePermissionRequest, ListQuery, RevokeQuery};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PartnerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_my_permissions).post(create_permission).delete(revoke_for_partner))
        .route("/topic/:topic_id", get(permissions_for_topic))
        .route("/check/:topic_id", get(check_permission))
        .route("/:id", delete(delete_permission))
}

pub async fn list_my_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let permissions = services
        .resolver
        .list_my_permissions(partner.partner_id(), query.page())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(permissions).into_response())
}

pub async fn permissions_for_topic(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(topic_id): Path<TopicId>,
) -> ApiResult {
    let permissions = services
        .resolver
        .permissions_for_topic(topic_id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(permissions).into_response())
}

pub async fn check_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(topic_id): Path<TopicId>,
) -> ApiResult {
    let allowed = services
        .resolver
        .check_permission(topic_id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    if !allowed {
        return Err(errors::access_error(AccessError::Forbidden));
    }
    Ok(Json(CheckResponse { topic_id, allowed }).into_response())
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<CreatePermissionRequest>,
) -> ApiResult {
    let permission = services
        .resolver
        .create_permission(body.topic_id, body.partner_id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok((StatusCode::CREATED, Json(permission)).into_response())
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Path(id): Path<PermissionId>,
) -> ApiResult {
    services
        .resolver
        .delete_permission(id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub async fn revoke_for_partner(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Query(query): Query<RevokeQuery>,
) -> ApiResult {
    services
        .resolver
        .delete_permission_for(query.partner_id, query.topic_id, partner.partner_id())
        .await
        .map_err(errors::access_error)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
