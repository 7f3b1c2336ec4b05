use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use relay_infra::{SearchRequest, SendAllRequest, SendRequest};

use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PartnerContext;

pub fn router() -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/send", post(send))
        .route("/send_all", post(send_all))
}

pub async fn search(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<SearchRequest>,
) -> ApiResult {
    let output = services
        .search
        .search(partner.partner_id(), &body)
        .await
        .map_err(errors::search_error)?;
    Ok(Json(output).into_response())
}

pub async fn send(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<SendRequest>,
) -> ApiResult {
    let receipt = services
        .publisher
        .send(partner.partner_id(), body)
        .await
        .map_err(errors::publish_error)?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

pub async fn send_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(partner): Extension<PartnerContext>,
    Json(body): Json<SendAllRequest>,
) -> ApiResult {
    let receipt = services
        .publisher
        .send_all(partner.partner_id(), body)
        .await
        .map_err(errors::publish_error)?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}
