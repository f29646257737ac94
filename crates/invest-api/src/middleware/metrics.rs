//! HTTP 요청 메트릭 미들웨어.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::metrics::{normalize_path, record_http_request};

/// 요청 수와 처리 시간을 기록합니다.
///
/// path 라벨은 라우트 템플릿(`/api/v1/tickers/{symbol}`)을 사용하여
/// 라벨 카디널리티를 제한합니다.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(request.uri().path()),
    };

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
