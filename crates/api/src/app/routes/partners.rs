use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use relay_core::PartnerId;

use crate::app::dto::ListQuery;
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_partners))
        .route("/:id", get(get_partner))
}

pub async fn list_partners(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let partners = services
        .resolver
        .list_partners(query.page())
        .await
        .map_err(errors::access_error)?;
    Ok(Json(partners).into_response())
}

pub async fn get_partner(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<PartnerId>,
) -> ApiResult {
    let partner = services.resolver.get_partner(id).await.map_err(errors::access_error)?;
    Ok(Json(partner).into_response())
}
