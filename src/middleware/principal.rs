use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tower_cookies::Cookies;

use crate::{error::AppError, models::Principal, state::AppState, utils::verify_token};

pub const AUTH_COOKIE: &str = "auth_token";

/// The authenticated caller, resolved from a bearer token or the
/// `auth_token` cookie. Rejects with 401 when neither yields an active user.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or(AppError::Unauthorized)?;

        let claims = verify_token(&token, &state.jwt_secret).map_err(|e| {
            log::debug!("Rejected token: {}", e);
            AppError::Unauthorized
        })?;
        let user_id = claims.user_id().ok_or(AppError::Unauthorized)?;

        // Role and activity come from the directory, not the token.
        let principal = state
            .directory
            .find_principal(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentPrincipal(principal))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookies = parts.extensions.get::<Cookies>()?;
    Some(cookies.get(AUTH_COOKIE)?.value().to_string())
}
