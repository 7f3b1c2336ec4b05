use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use relay_auth::Authenticator;
use relay_core::PartnerId;

use crate::app::errors;
use crate::context::{PartnerContext, PrincipalContext};

/// Optional caller-declared partner; must agree with the token when present.
pub const PARTNER_HEADER: &str = "x-partner-id";

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<Authenticator>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))?
        .to_owned();

    let principal = state
        .authenticator
        .authenticate(&token)
        .await
        .map_err(errors::bearer_error)?;

    if let Some(declared) = req.headers().get(PARTNER_HEADER) {
        let matches = declared
            .to_str()
            .ok()
            .and_then(|raw| raw.trim().parse::<PartnerId>().ok())
            .is_some_and(|id| id == principal.partner_id);
        if !matches {
            tracing::warn!(partner_id = %principal.partner_id, "declared partner does not match token");
            return Err(errors::json_error(
                StatusCode::FORBIDDEN,
                "partner_mismatch",
                "X-Partner-Id does not match the authenticated partner",
            ));
        }
    }

    req.extensions_mut().insert(PartnerContext::new(principal.partner_id));
    req.extensions_mut().insert(PrincipalContext::new(principal));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}
