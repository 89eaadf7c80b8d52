use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use chrono::{DateTime, Duration, Utc};

use crate::{
    auth::{issue_access_token, verify_password},
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::*,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/logout", post(logout))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "username and password are required".into(),
        ));
    }

    // 1) Load user
    let user = state
        .sessions
        .find_user_by_username(username)
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    // 2) Verify password before revealing account state
    if !verify_password(&req.password, &user.password_hash) {
        tracing::warn!(username, "login failed");
        return Err(ApiError::invalid_credentials());
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("FORBIDDEN", "Account is disabled".into()));
    }

    // 3) Create session_token
    let (access_token, token_hash) = issue_access_token();
    let expires_at = session_expiry(Utc::now(), state.session_ttl_hours)
        .ok_or_else(|| ApiError::Internal("session lifetime out of range".into()))?;

    let session = state
        .sessions
        .create_session(user.user_id, &token_hash, req.device_name.as_deref(), expires_at)
        .await?;

    tracing::info!(user_id = user.user_id, "login succeeded");

    Ok(Json(LoginResponse {
        data: LoginResponseData {
            access_token,
            expires_at: session.expires_at,
            user: UserProfile::from(&user),
        },
    }))
}

fn session_expiry(now: DateTime<Utc>, ttl_hours: i64) -> Option<DateTime<Utc>> {
    Duration::try_hours(ttl_hours).and_then(|ttl| now.checked_add_signed(ttl))
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<MeResponse>, ApiError> {
    let user = state
        .sessions
        .find_user(auth.user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(ApiError::session_expired)?;

    Ok(Json(MeResponse {
        data: MeResponseData {
            user: UserProfile::from(&user),
            session: SessionInfo {
                session_token_id: auth.session_token_id,
                expires_at: auth.expires_at,
            },
        },
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OkResponse>, ApiError> {
    state.sessions.revoke_session(auth.session_token_id).await?;
    tracing::info!(user_id = auth.user_id, "logged out");

    Ok(Json(OkResponse {
        data: OkData { ok: true },
    }))
}
