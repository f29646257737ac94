//! 클라이언트 IP별 rate limiting (token bucket).

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ApiErrorResponse;

/// Rate limiter 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 허용 요청 수
    pub requests_per_minute: u32,
    /// 순간 허용 추가량
    pub burst_size: u32,
    /// 유휴 버킷 정리 기준
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(1200)
    }
}

impl RateLimitConfig {
    /// 버스트는 분당 한도의 10%.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size: requests_per_minute / 10,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Rate limit 판정 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

/// IP별 token bucket 저장소.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<IpAddr, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.requests_per_minute) / 60.0 + f64::from(self.config.burst_size)
    }

    fn refill_per_sec(&self) -> f64 {
        f64::from(self.config.requests_per_minute) / 60.0
    }

    pub async fn check(&self, ip: IpAddr) -> RateLimitDecision {
        let capacity = self.capacity();
        let rate = self.refill_per_sec();
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(ip).or_insert(TokenBucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision::Allowed
        } else {
            let wait = if rate > 0.0 {
                (1.0 - bucket.tokens) / rate
            } else {
                60.0
            };
            RateLimitDecision::Limited {
                retry_after_secs: wait.ceil().max(1.0) as u64,
            }
        }
    }

    /// 유휴 버킷을 제거합니다.
    pub async fn cleanup(&self) {
        let idle = self.config.idle_timeout;
        self.buckets
            .lock()
            .await
            .retain(|_, bucket| bucket.last_refill.elapsed() < idle);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// 프록시 헤더, 연결 정보 순으로 클라이언트 IP를 찾습니다.
fn client_ip(request: &Request) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Rate limit 미들웨어.
///
/// 한도 초과 시 `Retry-After` 헤더와 함께 429를 반환합니다.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match limiter.check(ip).await {
        RateLimitDecision::Allowed => {
            counter!("rate_limit_requests_total", "status" => "allowed").increment(1);
            next.run(request).await
        }
        RateLimitDecision::Limited { retry_after_secs } => {
            counter!("rate_limit_requests_total", "status" => "limited").increment(1);
            tracing::warn!(client_ip = %ip, retry_after_secs, "Rate limit exceeded");

            let body = ApiErrorResponse::new(
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.",
            )
            .with_field("retry_after", retry_after_secs);

            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
    }
}

/// 주기적으로 유휴 버킷을 정리하는 태스크를 시작합니다.
pub fn spawn_cleanup_task(
    limiter: RateLimiter,
    shutdown: tokio_util::sync::CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => limiter.cleanup().await,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn config(rpm: u32, burst: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: rpm,
            burst_size: burst,
            idle_timeout: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_burst_then_limited() {
        let limiter = RateLimiter::new(config(60, 4));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        // 1 (초당) + 4 (버스트)
        for _ in 0..5 {
            assert_eq!(limiter.check(ip).await, RateLimitDecision::Allowed);
        }
        assert!(matches!(
            limiter.check(ip).await,
            RateLimitDecision::Limited { retry_after_secs } if retry_after_secs >= 1
        ));

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(limiter.check(other).await, RateLimitDecision::Allowed);
    }

    #[tokio::test]
    async fn test_cleanup_removes_idle_buckets() {
        let limiter = RateLimiter::new(config(60, 0));
        limiter.check("10.0.0.1".parse().unwrap()).await;
        assert_eq!(limiter.tracked_clients().await, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_clients().await, 0);
    }

    #[tokio::test]
    async fn test_middleware_returns_429_with_retry_after() {
        let limiter = RateLimiter::new(config(60, 0));
        let app = Router::new()
            .route("/", get(|| async { "OK" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        let request = || {
            axum::http::Request::builder()
                .uri("/")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(RETRY_AFTER));
    }
}
