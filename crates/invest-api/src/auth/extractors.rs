//! Axum 인증 추출기.
//!
//! Bearer 토큰을 검증하여 호출자 정보를 핸들러에 주입합니다.
//!
//! ```rust,ignore
//! async fn handler(user: AuthUser) -> impl IntoResponse {
//!     format!("Hello, {}", user.email)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

const MSG_MISSING_HEADER: &str = "Authorization header required";
const MSG_INVALID_FORMAT: &str = "Invalid authorization header format";
const MSG_INVALID_TOKEN: &str = "Invalid or expired token";

/// 인증된 사용자.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

/// `Authorization` 헤더 값에서 토큰을 꺼냅니다.
fn bearer_token(header: &str) -> Result<&str, ApiError> {
    let mut parts = header.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(ApiError::unauthorized(MSG_INVALID_FORMAT)),
    }
}

impl AuthUser {
    /// 헤더와 서명 키로 사용자를 검증합니다.
    pub fn from_header(header: Option<&str>, secret: &str) -> Result<Self, ApiError> {
        let header = header.ok_or_else(|| ApiError::unauthorized(MSG_MISSING_HEADER))?;
        let token = bearer_token(header)?;

        let claims = decode_token(token, secret).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            ApiError::unauthorized(MSG_INVALID_TOKEN)
        })?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| ApiError::unauthorized(MSG_INVALID_TOKEN))?;

        Ok(Self {
            user_id,
            email: claims.email,
            is_admin: claims.is_admin,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Self::from_header(header, &state.jwt_secret)
    }
}

/// 관리자 권한이 필요한 추출기.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

/// 워커 계정 추출기.
///
/// `users.is_worker`를 확인하고 마지막 활동 시각을 갱신합니다.
#[derive(Debug, Clone)]
pub struct WorkerUser(pub Uuid);

impl FromRequestParts<Arc<AppState>> for WorkerUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let pool = state.db()?;

        let is_worker: Option<bool> =
            sqlx::query_scalar("SELECT COALESCE(is_worker, FALSE) FROM users WHERE id = $1")
                .bind(user.user_id)
                .fetch_optional(pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Worker lookup failed");
                    None
                });

        if is_worker != Some(true) {
            return Err(ApiError::forbidden("Not authorized as a worker"));
        }

        if let Err(e) = sqlx::query("UPDATE users SET last_activity_at = NOW() WHERE id = $1")
            .bind(user.user_id)
            .execute(pool)
            .await
        {
            tracing::warn!(error = %e, user_id = %user.user_id, "Failed to update worker activity");
        }

        Ok(WorkerUser(user.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Claims};

    const SECRET: &str = "extractor-secret";

    fn token(user_id: &str, is_admin: bool) -> String {
        create_token(&Claims::new(user_id, "t@example.com", is_admin, 60), SECRET).unwrap()
    }

    fn message(err: ApiError) -> String {
        err.to_response_body().error
    }

    #[test]
    fn test_missing_header() {
        let err = AuthUser::from_header(None, SECRET).unwrap_err();
        assert_eq!(message(err), MSG_MISSING_HEADER);
    }

    #[test]
    fn test_invalid_header_format() {
        for header in ["Token abc", "Bearer", "Bearer   ", "bearer abc"] {
            let err = AuthUser::from_header(Some(header), SECRET).unwrap_err();
            assert_eq!(message(err), MSG_INVALID_FORMAT, "header: {header}");
        }
    }

    #[test]
    fn test_invalid_token() {
        let err = AuthUser::from_header(Some("Bearer invalid.token.here"), SECRET).unwrap_err();
        assert_eq!(message(err), MSG_INVALID_TOKEN);
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let header = format!("Bearer {}", token("user-123", false));
        let err = AuthUser::from_header(Some(&header), SECRET).unwrap_err();
        assert_eq!(message(err), MSG_INVALID_TOKEN);
    }

    #[test]
    fn test_valid_token() {
        let id = Uuid::new_v4();
        let header = format!("Bearer {}", token(&id.to_string(), true));
        let user = AuthUser::from_header(Some(&header), SECRET).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.email, "t@example.com");
        assert!(user.is_admin);
    }
}
