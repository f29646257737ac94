//! API 에러 타입과 응답 형식.
//!
//! 모든 핸들러는 `ApiResult<T>`를 반환하며, 에러는 다음 JSON 본문으로 직렬화됩니다:
//!
//! ```json
//! {
//!   "error": "Watch list not found",
//!   "code": "NOT_FOUND",
//!   "timestamp": 1738300800
//! }
//! ```
//!
//! `error` 필드는 클라이언트가 그대로 표시하는 메시지이므로 영문 문구를 유지합니다.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

use invest_core::CoreError;

/// Postgres unique_violation SQLSTATE.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// 에러 응답 본문.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 사람이 읽을 수 있는 에러 메시지
    pub error: String,
    /// 에러 코드 (예: "NOT_FOUND", "DB_ERROR")
    pub code: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// 엔드포인트별 추가 필드 (예: `symbol`, `message`)
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
            extra: Map::new(),
        }
    }

    /// 타임스탬프 없는 에러.
    pub fn simple(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            ..Self::new(code, error)
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// 최상위 필드를 추가합니다.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

/// 핸들러 에러.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// 내부 에러. 메시지는 클라이언트에 노출되므로 원인은 로그로만 남깁니다.
    #[error("{0}")]
    Internal(String),

    /// 분류되지 않은 DB 에러
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("{0}")]
    ServiceUnavailable(String),

    /// 상태 코드와 본문을 직접 지정하는 응답
    #[error("{}", .body.error)]
    Custom {
        status: StatusCode,
        body: Box<ApiErrorResponse>,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// DB 풀이 없을 때의 503.
    pub fn db_unavailable() -> Self {
        Self::unavailable("Database not available")
    }

    /// 원인을 로그로 남기고 고정 메시지의 500을 반환합니다.
    pub fn internal_with(msg: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "{}", msg);
        Self::Internal(msg.to_string())
    }

    pub fn custom(status: StatusCode, body: ApiErrorResponse) -> Self {
        Self::Custom {
            status,
            body: Box::new(body),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Custom { status, .. } => *status,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Database(_) => "DB_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Custom { .. } => "ERROR",
        }
    }

    /// 응답 본문으로 변환합니다.
    pub fn to_response_body(&self) -> ApiErrorResponse {
        match self {
            Self::Custom { body, .. } => (**body).clone(),
            Self::Database(_) => ApiErrorResponse::new(self.code(), "Internal server error"),
            other => ApiErrorResponse::new(other.code(), other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Database(ref err) = self {
            tracing::error!(error = %err, "Unhandled database error");
        }
        (status, Json(self.to_response_body())).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION) =>
            {
                Self::Conflict("Resource already exists".to_string())
            }
            _ => Self::Database(err),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
            })
            .collect();
        messages.sort();
        Self::BadRequest(messages.join("; "))
    }
}

/// unique_violation 여부.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::unauthorized("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::db_unavailable().status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_other_sqlx_errors_map_to_500() {
        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        // 내부 원인은 노출하지 않는다
        assert_eq!(err.to_response_body().error, "Internal server error");
    }

    #[test]
    fn test_core_error_conversion() {
        let err: ApiError = CoreError::invalid_input("Invalid status").into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid status");
    }

    #[test]
    fn test_validation_errors_map_to_400() {
        use validator::Validate;

        #[derive(Validate)]
        struct Input {
            #[validate(length(min = 1, message = "Name is required"))]
            name: String,
        }

        let err: ApiError = Input { name: String::new() }.validate().unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Name is required");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::not_found("Watch list not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Watch list not found");
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json["timestamp"].is_i64());
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_custom_body_with_extra_fields() {
        let body = ApiErrorResponse::simple("NOT_FOUND", "Stock not found").with_field("symbol", "ZZZZ");
        let response = ApiError::custom(StatusCode::NOT_FOUND, body).into_response();

        let json = body_json(response).await;
        assert_eq!(json["error"], "Stock not found");
        assert_eq!(json["symbol"], "ZZZZ");
        assert!(json.get("timestamp").is_none());
    }
}
