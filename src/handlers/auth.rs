use axum::{extract::State, http::StatusCode, response::Json};
use tower_cookies::{Cookie, Cookies};

use crate::{
    error::AppError,
    middleware::{CurrentPrincipal, AUTH_COOKIE},
    models::{LoginRequest, MeResponse, TokenResponse},
    state::AppState,
    utils::{create_token, verify_password},
};

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(form): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let username = form.username.trim();
    let credentials = state
        .directory
        .find_credentials(username)
        .await?
        .filter(|c| verify_password(&form.password, &c.password_hash));

    let Some(credentials) = credentials else {
        log::info!("Failed login for '{}'", username);
        return Err(AppError::Unauthorized);
    };
    let principal = credentials.principal;

    let token = create_token(&principal, &state.jwt_secret)
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

    // Set secure HTTP-only cookie with JWT token
    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::hours(24))
        .build();
    cookies.add(cookie);

    log::info!("User {} logged in as {}", principal.id, principal.role);
    Ok(Json(TokenResponse {
        access: token,
        role: principal.role,
    }))
}

pub async fn logout(cookies: Cookies) -> StatusCode {
    cookies.remove(Cookie::build(AUTH_COOKIE).path("/").build());
    StatusCode::NO_CONTENT
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> Json<MeResponse> {
    Json(MeResponse::from(principal))
}
