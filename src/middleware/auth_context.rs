use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::{AppState, Role, authorize};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub role: Role,
    pub session_token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl AuthContext {
    /// 403 unless the caller holds at least `required`.
    pub fn require(&self, required: Role) -> Result<(), ApiError> {
        if authorize(self.role, required) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = self.user_id,
                role = self.role.as_str(),
                required = required.as_str(),
                "access denied"
            );
            Err(ApiError::access_denied())
        }
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            let row = state
                .sessions
                .find_session(&token_hash)
                .await?
                .ok_or_else(ApiError::session_expired)?;

            // unknown smallint roles get no capabilities
            let role = Role::from_i16(row.roles).unwrap_or(Role::Patient);

            Ok(AuthContext {
                user_id: row.user_id,
                role,
                session_token_id: row.session_token_id,
                expires_at: row.expires_at,
            })
        }
    }
}
