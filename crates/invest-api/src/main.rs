//! InvestorCenter API 서버.
//!
//! 설정을 로드하고 Postgres/Redis/시세 제공자에 연결한 뒤 Axum 서버를 시작합니다.
//! 외부 연결은 모두 선택적이며, 연결에 실패해도 서버는 해당 기능 없이 뜹니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use invest_api::metrics::setup_metrics_recorder;
use invest_api::middleware::{
    metrics_layer, rate_limit_middleware, spawn_cleanup_task, RateLimitConfig, RateLimiter,
};
use invest_api::openapi::swagger_ui_router;
use invest_api::routes::create_api_router;
use invest_api::services::PolygonClient;
use invest_api::state::AppState;
use invest_core::{init_logging, init_logging_from_env, AppConfig, CorsConfig, LogConfig};

/// 설정으로 공유 상태를 만듭니다.
async fn create_app_state(config: AppConfig) -> AppState {
    let database = config.database.clone();
    let redis_url = config.redis.url.clone();
    let market_data = PolygonClient::from_config(&config.market_data);

    let mut state = AppState::new(config);

    match database.url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .acquire_timeout(Duration::from_secs(database.connection_timeout_secs))
                .connect(url)
                .await;
            match pool {
                Ok(pool) => {
                    info!("Database connected");
                    state = state.with_db_pool(pool);
                }
                Err(e) => warn!(error = %e, "Database connection failed, continuing without DB"),
            }
        }
        None => warn!("DATABASE_URL not set, continuing without DB"),
    }

    if let Some(url) = redis_url {
        state = state.with_redis_url(&url).await;
    }

    match market_data {
        Ok(Some(client)) => {
            info!("Polygon market data client configured");
            state = state.with_market_data(Arc::new(client));
        }
        Ok(None) => warn!("POLYGON_API_KEY not set, live quotes disabled"),
        Err(e) => warn!(error = %e, "Failed to build Polygon client, live quotes disabled"),
    }

    state
}

/// CORS 미들웨어 구성.
///
/// 허용 origin이 하나도 파싱되지 않으면 모든 origin을 허용합니다.
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origins: Vec<_> = cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let (allow_origin, credentials) = if origins.is_empty() {
        warn!("No valid CORS origins configured, allowing any origin");
        (AllowOrigin::any(), false)
    } else {
        info!("CORS configured with {} allowed origins", origins.len());
        (AllowOrigin::list(origins), true)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(credentials)
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    shutdown: &CancellationToken,
) -> Router {
    let config = state.config.clone();

    // 메트릭 라우터 (별도 상태, Rate Limit 제외)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let api_router = if config.rate_limit.disabled {
        info!("Rate limiting DISABLED");
        create_api_router().with_state(state)
    } else {
        let rpm = config.rate_limit.requests_per_minute;
        info!(requests_per_minute = rpm, "Rate limiting configured");
        let limiter = RateLimiter::new(RateLimitConfig::new(rpm));
        spawn_cleanup_task(limiter.clone(), shutdown.clone());
        create_api_router()
            .with_state(state)
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
    };

    Router::new()
        .merge(metrics_router)
        .merge(api_router)
        .merge(swagger_ui_router())
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(cors_layer(&config.cors))
}

/// OpenAPI 스펙 내보내기 처리.
///
/// `--export-openapi` 플래그 또는 `EXPORT_OPENAPI` 환경변수가 설정된 경우
/// OpenAPI JSON을 stdout으로 출력합니다. 출력했으면 `true`.
fn export_openapi_requested() -> anyhow::Result<bool> {
    use invest_api::openapi::ApiDoc;
    use utoipa::OpenApi as _;

    let export_flag = std::env::args().any(|arg| arg == "--export-openapi");
    let export_env = std::env::var("EXPORT_OPENAPI")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if !(export_flag || export_env) {
        return Ok(false);
    }

    let json = serde_json::to_string_pretty(&ApiDoc::openapi())?;
    println!("{json}");
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    if export_openapi_requested()? {
        return Ok(());
    }

    let config = match AppConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            // 설정 없이도 에러는 남기도록 환경 변수 기준 로거를 설치
            if let Err(log_err) = init_logging_from_env() {
                eprintln!("failed to initialize logging: {log_err}");
            }
            error!(error = %e, "Failed to load configuration");
            return Err(e).context("failed to load configuration");
        }
    };

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!("Starting InvestorCenter API server...");

    if config.auth.is_insecure_default() {
        warn!("JWT_SECRET not set, using default (INSECURE for development only)");
    }

    let metrics_handle =
        setup_metrics_recorder().context("failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .context("invalid API_HOST/API_PORT")?;

    let state = Arc::new(create_app_state(config).await);
    info!(
        version = %state.version,
        has_db = state.db_pool.is_some(),
        has_redis = state.redis.is_some(),
        has_market_data = state.market_data.is_some(),
        "Service connections status"
    );

    // 전역 종료 토큰 (백그라운드 태스크에 전파)
    let shutdown_token = CancellationToken::new();
    let app = create_router(state, metrics_handle, &shutdown_token);

    info!(%addr, "API server listening");
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    // rate limiter가 클라이언트 IP를 알 수 있도록 ConnectInfo 제공
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await?;

    shutdown_token.cancel();
    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM을 받으면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
}
