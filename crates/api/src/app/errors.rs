//! Consistent `{"error", "message"}` responses for every failure path.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use relay_auth::{AccessError, LoginError, TokenError};
use relay_infra::document_store::DocumentStoreError;
use relay_infra::{GatewayError, PublishError, SearchError};

/// Handlers short-circuit with `?` on the error response.
pub type ApiResult = Result<Response, Response>;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

fn internal(code: &'static str, err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, code, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, code, "internal error")
}

pub fn access_error(err: AccessError) -> Response {
    let message = err.to_string();
    match err {
        AccessError::TopicNotFound => json_error(StatusCode::NOT_FOUND, "topic_not_found", message),
        AccessError::PartnerNotFound => json_error(StatusCode::NOT_FOUND, "partner_not_found", message),
        AccessError::PermissionNotFound => json_error(StatusCode::NOT_FOUND, "permission_not_found", message),
        AccessError::SubscriptionNotFound => json_error(StatusCode::NOT_FOUND, "subscription_not_found", message),
        AccessError::Forbidden => json_error(StatusCode::FORBIDDEN, "forbidden", message),
        AccessError::PermissionAlreadyExists => {
            json_error(StatusCode::BAD_REQUEST, "permission_already_exists", message)
        }
        AccessError::Validation(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        AccessError::Directory(e) => internal("store_error", e),
    }
}

pub fn gateway_error(err: GatewayError) -> Response {
    match err {
        GatewayError::TimedOut => json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string()),
        GatewayError::Validation(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        GatewayError::Store(DocumentStoreError::UnsupportedOperator(op)) => json_error(
            StatusCode::BAD_REQUEST,
            "unsupported_operator",
            format!("operator {op} is not supported"),
        ),
        GatewayError::Store(e) => internal("store_error", e),
    }
}

pub fn search_error(err: SearchError) -> Response {
    match err {
        SearchError::ForbiddenOperator { field } => json_error(
            StatusCode::BAD_REQUEST,
            "forbidden_operator",
            format!("$where is not allowed in {field}"),
        ),
        SearchError::Access(e) => access_error(e),
        SearchError::Gateway(e) => gateway_error(e),
        SearchError::Malformed(e) => internal("store_error", e),
    }
}

pub fn publish_error(err: PublishError) -> Response {
    match err {
        PublishError::TooManyNotifications { .. } => {
            json_error(StatusCode::TOO_MANY_REQUESTS, "too_many_notifications", err.to_string())
        }
        PublishError::Access(e) => access_error(e),
        PublishError::Gateway(e) => gateway_error(e),
    }
}

/// Failures of `/auth/token` and `/auth/refresh`.
///
/// Unknown user and wrong password share one body.
pub fn login_error(err: LoginError) -> Response {
    match err {
        LoginError::UnknownUser | LoginError::WrongPassword => {
            tracing::info!(reason = %err, "login refused");
            json_error(StatusCode::FORBIDDEN, "invalid_credentials", "invalid username or password")
        }
        LoginError::Token(TokenError::Expired) => {
            json_error(StatusCode::FORBIDDEN, "token_expired", "token expired")
        }
        LoginError::Token(e) => json_error(StatusCode::FORBIDDEN, "invalid_token", e.to_string()),
        LoginError::Issue(e) => internal("token_error", e),
        LoginError::Password(e) => internal("password_error", e),
        LoginError::Directory(e) => internal("store_error", e),
    }
}

/// Failures while binding a bearer token on protected routes.
pub fn bearer_error(err: LoginError) -> Response {
    match err {
        LoginError::Token(TokenError::Expired) => {
            json_error(StatusCode::UNAUTHORIZED, "token_expired", "token expired")
        }
        LoginError::Token(e) => json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string()),
        LoginError::UnknownUser | LoginError::WrongPassword => {
            json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
        }
        other => login_error(other),
    }
}
