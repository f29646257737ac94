//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! `Arc<AppState>`로 래핑되어 axum `State` extractor로 주입됩니다.
//! Postgres, Redis, 시세 제공자는 모두 선택적이며, 없을 때 해당 핸들러는 503을
//! 반환합니다.

use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use invest_core::AppConfig;

use crate::error::{ApiError, ApiResult};
use crate::services::{MarketDataProvider, MoversCache};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 데이터베이스 연결 풀
    pub db_pool: Option<PgPool>,

    /// Redis 연결 (암호화폐 실시간 시세)
    pub redis: Option<ConnectionManager>,

    /// 외부 시세 제공자 (Polygon.io)
    pub market_data: Option<Arc<dyn MarketDataProvider>>,

    /// 급등락 종목 캐시
    pub movers_cache: Arc<MoversCache>,

    /// JWT 서명 키
    pub jwt_secret: String,

    /// 로드된 설정
    pub config: Arc<AppConfig>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 설정에서 외부 연결 없이 상태를 생성합니다.
    pub fn new(config: AppConfig) -> Self {
        let ttl = Duration::from_secs(config.market_data.movers_cache_ttl_secs);
        Self {
            db_pool: None,
            redis: None,
            market_data: None,
            movers_cache: Arc::new(MoversCache::new(ttl)),
            jwt_secret: config.auth.jwt_secret.clone(),
            config: Arc::new(config),
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn with_redis(mut self, redis: ConnectionManager) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Redis URL로 연결합니다. 실패하면 Redis 없이 계속합니다.
    pub async fn with_redis_url(self, redis_url: &str) -> Self {
        let connect = async {
            let client = redis::Client::open(redis_url)?;
            ConnectionManager::new(client).await
        };
        let timeout = Duration::from_secs(self.config.redis.connection_timeout_secs);

        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(manager)) => {
                tracing::info!("Redis 연결 성공");
                return self.with_redis(manager);
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Redis 연결 실패. Redis 없이 계속합니다.");
            }
            Err(_) => {
                tracing::warn!("Redis 연결 타임아웃. Redis 없이 계속합니다.");
            }
        }
        self
    }

    pub fn with_market_data(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        self.market_data = Some(provider);
        self
    }

    /// DB 풀을 반환합니다. 없으면 503.
    pub fn db(&self) -> ApiResult<&PgPool> {
        self.db_pool.as_ref().ok_or_else(ApiError::db_unavailable)
    }

    /// Redis 연결을 반환합니다. 없으면 503.
    ///
    /// `ConnectionManager`는 복제 비용이 낮고 내부적으로 연결을 공유합니다.
    pub fn redis_conn(&self) -> ApiResult<ConnectionManager> {
        self.redis
            .clone()
            .ok_or_else(|| ApiError::unavailable("Redis not available"))
    }

    /// 시세 제공자를 반환합니다. 없으면 503.
    pub fn market_data(&self) -> ApiResult<Arc<dyn MarketDataProvider>> {
        self.market_data
            .clone()
            .ok_or_else(|| ApiError::unavailable("Market data provider not configured"))
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    pub async fn is_db_healthy(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            None => false,
        }
    }

    pub async fn is_redis_healthy(&self) -> bool {
        match self.redis.clone() {
            Some(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            None => false,
        }
    }
}

/// 테스트용 AppState.
///
/// DB, Redis, 시세 제공자가 모두 없는 상태입니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    AppState::new(config)
}

/// 테스트 토큰 서명 키.
#[cfg(any(test, feature = "test-utils"))]
pub const TEST_JWT_SECRET: &str = "test-secret-for-unit-tests";
