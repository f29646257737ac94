//! Prometheus 메트릭 설정 및 기록 헬퍼.
//!
//! HTTP 요청 메트릭과 시세 연동 메트릭을 수집하고 `/metrics`로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Prometheus 레코더를 전역으로 설치하고 렌더링 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러입니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()
}

// ==================== HTTP ====================

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}

// ==================== 시세 연동 ====================

/// 외부 시세 API 호출 결과.
pub fn record_vendor_request(provider: &str, endpoint: &'static str, success: bool) {
    counter!(
        "market_data_requests_total",
        "provider" => provider.to_string(),
        "endpoint" => endpoint,
        "result" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// 급등락 캐시 적중 여부.
pub fn record_movers_cache(hit: bool) {
    counter!(
        "movers_cache_lookups_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

pub fn increment_sse_streams() {
    gauge!("crypto_sse_streams_active").increment(1.0);
}

pub fn decrement_sse_streams() {
    gauge!("crypto_sse_streams_active").decrement(1.0);
}

/// 경로의 동적 세그먼트를 `:id`로 치환합니다.
///
/// 라우터가 매칭한 경로를 알 수 없을 때(404 등)만 사용합니다.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid = uuid::Uuid::parse_str(segment).is_ok();
            let is_numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
            if is_uuid || is_numeric {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/v1/watchlists/123e4567-e89b-12d3-a456-426614174000/items"),
            "/api/v1/watchlists/:id/items"
        );
        assert_eq!(
            normalize_path("/api/v1/admin/task-types/42"),
            "/api/v1/admin/task-types/:id"
        );
        assert_eq!(normalize_path("/api/v1/tickers/AAPL"), "/api/v1/tickers/AAPL");
    }
}
