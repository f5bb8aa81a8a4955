//! Sign-in endpoints.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use reqwest::Url;
use serde::Deserialize;

use super::{success, ApiResult, ValidatedJson};
use crate::auth::oauth::GoogleOAuth;
use crate::auth::{constant_time_compare, cookie_value, AuthUser, OAUTH_STATE_COOKIE};
use crate::errors::AppError;
use crate::models::{DevLoginRequest, LoginResponse, User};
use crate::AppState;

/// Lifetime of the state cookie, long enough to finish the consent screen.
const STATE_COOKIE_MAX_AGE_SECS: u32 = 600;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

fn oauth_client(state: &AppState) -> Result<&GoogleOAuth, AppError> {
    state
        .oauth
        .as_deref()
        .ok_or_else(|| AppError::NotConfigured("OAuth not configured".to_string()))
}

fn state_cookie(value: &str, max_age: u32, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/api/v1/auth; Max-Age={}; HttpOnly; SameSite=Lax",
        OAUTH_STATE_COOKIE, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// GET /api/v1/auth/login - Redirect to Google's consent screen.
pub async fn login(State(state): State<AppState>) -> Result<Response, AppError> {
    let oauth = oauth_client(&state)?;

    let nonce = GoogleOAuth::new_state();
    let url = oauth.authorization_url(&nonce)?;
    let cookie = state_cookie(&nonce, STATE_COOKIE_MAX_AGE_SECS, state.config.is_production());

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(url.as_str())).into_response())
}

/// GET /api/v1/auth/callback - Finish the OAuth flow and hand a token to the frontend.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let oauth = oauth_client(&state)?;

    let code = params
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let state_matches = match (params.state.as_deref(), cookie_value(&headers, OAUTH_STATE_COOKIE)) {
        (Some(query), Some(cookie)) => !query.is_empty() && constant_time_compare(query, cookie),
        _ => false,
    };
    if !state_matches {
        tracing::warn!("OAuth callback rejected: state mismatch");
        return Err(AppError::Unauthorized("Invalid OAuth state".to_string()));
    }

    let tokens = oauth.exchange_code(code).await?;
    let info = oauth.fetch_userinfo(&tokens.access_token).await?;

    let mut user = state
        .repo
        .get_user_by_email(&info.email)
        .await?
        .ok_or_else(|| AppError::Forbidden("User not registered. Contact your admin.".to_string()))?;

    if let Some(picture) = info.picture.filter(|p| user.avatar_url.as_deref() != Some(p.as_str())) {
        match state.repo.update_avatar(&user.id, &picture).await {
            Ok(()) => user.avatar_url = Some(picture),
            Err(e) => tracing::warn!(user_id = %user.id, "Failed to update avatar: {}", e),
        }
    }

    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = %user.id, "User signed in");

    let target = Url::parse_with_params(
        &format!("{}/auth/callback", state.config.frontend_url),
        &[("token", token.as_str())],
    )
    .map_err(|e| AppError::Internal(format!("Invalid frontend URL: {}", e)))?;
    let clear = state_cookie("", 0, state.config.is_production());

    Ok(([(header::SET_COOKIE, clear)], Redirect::to(target.as_str())).into_response())
}

/// POST /api/v1/auth/dev-login - Issue a token by email. Not routed in production.
pub async fn dev_login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<DevLoginRequest>,
) -> ApiResult<LoginResponse> {
    let user = state
        .repo
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = %user.id, "Dev login");
    success(LoginResponse { token, user })
}

/// GET /api/v1/auth/me - The caller's user record.
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<User> {
    match state.repo.get_user(&user.id).await? {
        Some(user) => success(user),
        None => Err(AppError::NotFound("User not found".to_string())),
    }
}
