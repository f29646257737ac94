//! OpenAPI 문서화 설정.
//!
//! utoipa로 공개 REST API의 OpenAPI 3.0 스펙을 생성합니다.
//! Swagger UI는 `/swagger-ui` 경로에서 사용 가능합니다.
//!
//! 로그인/관리자/워커 전용 엔드포인트는 문서에 포함하지 않습니다.
//! 새로운 공개 엔드포인트를 추가할 때:
//!
//! 1. 응답/요청 타입에 `#[derive(ToSchema)]` 추가
//! 2. 핸들러에 `#[utoipa::path(...)]` 어노테이션 추가
//! 3. 이 파일의 `paths(...)` 섹션에 추가 (응답 스키마는 경로에서 자동 수집됩니다)

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiErrorResponse;
use crate::repository::financials::{FinancialPeriod, FinancialsMetadata, StoredMetrics};
use crate::repository::screener::ScreenerStock;
use crate::repository::sentiment::{RepresentativePost, SentimentSnapshot};
use crate::repository::subscriptions::SubscriptionPlan;
use crate::repository::tickers::{NewStock, Stock};
use crate::routes::{
    AllFinancialsResponse, ComponentHealth, ComponentStatus, CryptoPricesResponse,
    HealthResponse, IndicesResponse, MoversResponse, PostsResponse, PriceResponse,
    ReadinessResponse, ScreenerResponse, SearchResponse, SentimentHistoryResponse,
    SentimentResponse, StatementsResponse, StockListResponse, StockResponse, TrendingResponse,
};
use crate::services::{CryptoQuote, MarketMovers, MoverStock};
use crate::types::{MessageResponse, TimestampMeta};

/// InvestorCenter 공개 API 문서.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "InvestorCenter API",
        version = "0.1.0",
        description = r#"
# InvestorCenter REST API

주식/암호화폐 시세, 시장 동향, 소셜 감성 분석을 제공하는 REST API입니다.

## 주요 기능

- **종목**: 종목 목록, 상세, 현재가
- **시장**: 검색, 상승/하락/거래량 상위 종목, 주요 지수(ETF 기준)
- **암호화폐**: Redis 캐시 기반 시세와 SSE 스트림
- **감성 분석**: 트렌딩 티커, 티커별 감성 요약/히스토리/대표 게시물
- **스크리너**: 밸류에이션/수익성 지표 기반 종목 필터
- **재무**: 기간별 재무제표(전년 대비 변화율 포함)와 저장된 재무 지표

## 인증

관심 목록, 구독, 알림, 관리자/워커 API는 JWT Bearer 토큰이 필요하며 이 문서에는 포함되지 않습니다.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "로컬 개발 서버"),
    ),
    tags(
        (name = "health", description = "헬스 체크 - 서버 상태 확인"),
        (name = "tickers", description = "종목 - 목록/상세/현재가"),
        (name = "markets", description = "시장 - 검색, 상위 종목, 지수"),
        (name = "crypto", description = "암호화폐 - 시세 및 스트림"),
        (name = "sentiment", description = "감성 분석 - 소셜 게시물 기반"),
        (name = "screener", description = "스크리너 - 종목 필터링"),
        (name = "financials", description = "재무 - 재무제표와 지표"),
        (name = "subscriptions", description = "구독 - 공개 플랜 조회")
    ),
    // ==================== 스키마 등록 ====================
    components(
        schemas(
            // ===== Common =====
            ApiErrorResponse,
            MessageResponse,
            TimestampMeta,

            // ===== Health =====
            HealthResponse,
            ReadinessResponse,
            ComponentHealth,
            ComponentStatus,

            // ===== Tickers / Markets =====
            Stock,
            NewStock,
            StockListResponse,
            StockResponse,
            PriceResponse,
            SearchResponse,
            MoversResponse,
            MarketMovers,
            MoverStock,
            IndicesResponse,

            // ===== Crypto =====
            CryptoQuote,
            CryptoPricesResponse,

            // ===== Sentiment =====
            SentimentSnapshot,
            RepresentativePost,
            TrendingResponse,
            SentimentResponse,
            SentimentHistoryResponse,
            PostsResponse,

            // ===== Screener / Subscriptions =====
            ScreenerStock,
            ScreenerResponse,
            SubscriptionPlan,

            // ===== Financials =====
            FinancialPeriod,
            FinancialsMetadata,
            StatementsResponse,
            AllFinancialsResponse,
            StoredMetrics,
        )
    ),
    // ==================== 경로 등록 ====================
    paths(
        // ===== Health =====
        crate::routes::health::health_check,
        crate::routes::health::health_ready,

        // ===== Tickers =====
        crate::routes::tickers::list_stocks,
        crate::routes::tickers::create_stock,
        crate::routes::tickers::get_stock,
        crate::routes::tickers::get_price,

        // ===== Markets =====
        crate::routes::markets::search_securities,
        crate::routes::markets::get_movers,
        crate::routes::markets::get_indices,

        // ===== Crypto =====
        crate::routes::crypto::get_crypto_price,
        crate::routes::crypto::get_all_crypto_prices,
        crate::routes::crypto::stream_crypto_prices,

        // ===== Sentiment =====
        crate::routes::sentiment::get_trending,
        crate::routes::sentiment::get_ticker_sentiment,
        crate::routes::sentiment::get_sentiment_history,
        crate::routes::sentiment::get_ticker_posts,

        // ===== Screener =====
        crate::routes::screener::get_screener_stocks,

        // ===== Financials =====
        crate::routes::financials::get_all_financials,
        crate::routes::financials::get_income_statements,
        crate::routes::financials::get_balance_sheets,
        crate::routes::financials::get_cash_flow_statements,
        crate::routes::financials::get_ratios,
        crate::routes::financials::get_fundamentals,

        // ===== Subscriptions =====
        crate::routes::subscriptions::list_plans,
        crate::routes::subscriptions::get_plan,
    )
)]
pub struct ApiDoc;

// ==================== Swagger UI 라우터 ====================

/// Swagger UI 라우터 생성.
///
/// - `/swagger-ui` - Swagger UI 대화형 문서
/// - `/api-docs/openapi.json` - OpenAPI JSON 스펙
pub fn swagger_ui_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
