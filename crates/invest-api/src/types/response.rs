//! 응답 래퍼.
//!
//! 관리 도구 계열 API(워커, 작업, 노트)는 `{"success": true, "data": ...}` 형식을
//! 사용합니다.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<SuccessResponse<T>> {
    Json(SuccessResponse {
        success: true,
        data,
    })
}

/// `{"success": true, "message": ...}`
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// `{"message": ...}`
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// 응답 시각만 담는 meta.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimestampMeta {
    pub timestamp: DateTime<Utc>,
}

impl TimestampMeta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let Json(body) = success(vec![1, 2, 3]);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));

        let Json(message) = MessageResponse::ok("Heartbeat received");
        assert_eq!(message.message, "Heartbeat received");
    }
}
