use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::dto::{AccessTokenResponse, AuthorizationResponse, LoginRequest, RefreshRequest};
use crate::app::errors::{self, ApiResult};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Token endpoints reachable without a bearer.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/token", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn protected_router() -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/authorization", get(authorization))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> ApiResult {
    let pair = services
        .authenticator
        .login(&body.username, &body.password)
        .await
        .map_err(errors::login_error)?;
    Ok((StatusCode::OK, Json(pair)).into_response())
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult {
    let access_token = services
        .authenticator
        .refresh(&body.refresh_token)
        .await
        .map_err(errors::login_error)?;
    Ok(Json(AccessTokenResponse { access_token, token_type: "bearer" }).into_response())
}

pub async fn me(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    Json(principal.principal().clone())
}

/// Identity of the caller, echoed in `X-User-Id` / `X-Partner-Id` for gateways.
pub async fn authorization(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let p = principal.principal();
    let mut response = Json(AuthorizationResponse { user_id: p.id, partner_id: p.partner_id }).into_response();

    let headers = response.headers_mut();
    for (name, value) in [("x-user-id", p.id.to_string()), ("x-partner-id", p.partner_id.to_string())] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    response
}
