//! 암호화폐 실시간 시세 API (Redis).
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/crypto/{symbol}/price` - 단일 시세
//! - `GET /api/v1/crypto/prices` - 순위 목록 전체 시세
//! - `GET /api/v1/crypto/stream?symbols=` - SSE 시세 스트림 (1초 간격)

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::metrics::{decrement_sse_streams, increment_sse_streams};
use crate::services::crypto::{self, CryptoQuote, CryptoQuoteError, DEFAULT_STREAM_SYMBOLS};
use crate::state::AppState;
use crate::utils::split_csv;

/// 스트림 전송 간격.
const STREAM_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, ToSchema)]
pub struct CryptoPricesResponse {
    pub timestamp: DateTime<Utc>,
    pub count: usize,
    pub prices: BTreeMap<String, CryptoQuote>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// 쉼표 구분 심볼 (기본: 시가총액 상위 10개)
    pub symbols: Option<String>,
}

/// 열린 스트림 수 게이지. 클라이언트가 끊기면 스트림과 함께 drop됩니다.
struct StreamGauge;

impl StreamGauge {
    fn open() -> Self {
        increment_sse_streams();
        Self
    }
}

impl Drop for StreamGauge {
    fn drop(&mut self) {
        decrement_sse_streams();
        debug!("Crypto price stream closed");
    }
}

/// 스트림 대상 심볼. 비어 있으면 기본 목록.
fn stream_symbols(raw: Option<&str>) -> Vec<String> {
    let symbols: Vec<String> = split_csv(raw).iter().map(|s| s.to_uppercase()).collect();
    if symbols.is_empty() {
        DEFAULT_STREAM_SYMBOLS.iter().map(|s| s.to_string()).collect()
    } else {
        symbols
    }
}

/// 단일 암호화폐 시세.
#[utoipa::path(
    get,
    path = "/api/v1/crypto/{symbol}/price",
    params(("symbol" = String, Path, description = "암호화폐 심볼 (예: BTC)")),
    responses(
        (status = 200, description = "시세", body = CryptoQuote),
        (status = 404, description = "시세 없음", body = ApiErrorResponse),
        (status = 503, description = "Redis 없음", body = ApiErrorResponse)
    ),
    tag = "crypto"
)]
pub async fn get_crypto_price(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<CryptoQuote>> {
    let mut conn = state.redis_conn()?;
    let symbol = symbol.trim().to_uppercase();

    match crypto::fetch_quote(&mut conn, &symbol).await {
        Ok(Some(quote)) => Ok(Json(quote)),
        Ok(None) => Err(ApiError::not_found(format!(
            "Real-time price not available for {}",
            symbol
        ))),
        Err(CryptoQuoteError::Decode(e)) => Err(ApiError::internal_with("Invalid price data", e)),
        Err(e) => Err(ApiError::internal_with("Failed to fetch price", e)),
    }
}

/// 순위 목록의 전체 시세. 시세가 없는 심볼은 제외됩니다.
#[utoipa::path(
    get,
    path = "/api/v1/crypto/prices",
    responses(
        (status = 200, description = "전체 시세", body = CryptoPricesResponse),
        (status = 503, description = "Redis 없음", body = ApiErrorResponse)
    ),
    tag = "crypto"
)]
pub async fn get_all_crypto_prices(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<CryptoPricesResponse>> {
    let mut conn = state.redis_conn()?;
    let prices = crypto::fetch_ranked_quotes(&mut conn)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch symbols", e))?;

    debug!(count = prices.len(), "Fetched ranked crypto prices");
    Ok(Json(CryptoPricesResponse {
        timestamp: Utc::now(),
        count: prices.len(),
        prices,
    }))
}

/// SSE 시세 스트림.
///
/// 매 초 `data: {"BTC":{"price":..,"change":..}}` 이벤트를 보냅니다.
/// 클라이언트가 연결을 끊으면 스트림이 drop되어 폴링도 멈춥니다.
#[utoipa::path(
    get,
    path = "/api/v1/crypto/stream",
    params(StreamQuery),
    responses(
        (status = 200, description = "text/event-stream"),
        (status = 503, description = "Redis 없음", body = ApiErrorResponse)
    ),
    tag = "crypto"
)]
pub async fn stream_crypto_prices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let conn = state.redis_conn()?;
    let symbols = stream_symbols(query.symbols.as_deref());
    info!(symbols = symbols.len(), "Crypto price stream opened");

    let mut interval = tokio::time::interval(STREAM_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let events = stream::unfold(
        (conn, interval, symbols, StreamGauge::open()),
        |(mut conn, mut interval, symbols, gauge)| async move {
            interval.tick().await;
            let quotes = crypto::fetch_quotes(&mut conn, &symbols).await;
            let event = Event::default().data(crypto::stream_payload(&quotes).to_string());
            Some((Ok::<_, Infallible>(event), (conn, interval, symbols, gauge)))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

pub fn crypto_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prices", get(get_all_crypto_prices))
        .route("/stream", get(stream_crypto_prices))
        .route("/{symbol}/price", get(get_crypto_price))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/crypto", crypto_router())
            .with_state(Arc::new(create_test_state()))
    }

    #[tokio::test]
    async fn test_endpoints_without_redis_are_503() {
        for uri in ["/crypto/BTC/price", "/crypto/prices", "/crypto/stream"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
    }

    #[test]
    fn test_stream_symbols() {
        assert_eq!(stream_symbols(Some("btc, eth,")), vec!["BTC", "ETH"]);
        let defaults = stream_symbols(None);
        assert_eq!(defaults.len(), 10);
        assert_eq!(defaults[0], "BTC");
        assert_eq!(defaults[9], "SHIB");
    }
}
