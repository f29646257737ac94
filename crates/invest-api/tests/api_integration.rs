//! 전체 라우터 통합 테스트.
//!
//! DB/Redis 없이 구성한 상태에 mockito로 띄운 Polygon 서버를 붙여
//! 라우팅, 인증, 시세 연동 경로를 확인합니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use mockito::Matcher;
use tower::ServiceExt;

use invest_api::auth::{create_token, Claims};
use invest_api::routes::create_api_router;
use invest_api::services::PolygonClient;
use invest_api::state::AppState;
use invest_core::AppConfig;

const SECRET: &str = "integration-test-secret";
const SNAPSHOT_PATH: &str = "/v2/snapshot/locale/us/markets/stocks/tickers";

fn base_state() -> AppState {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    AppState::new(config)
}

fn app(state: AppState) -> Router {
    create_api_router().with_state(Arc::new(state))
}

fn app_with_polygon(url: String) -> Router {
    let client = PolygonClient::new("test-key", url, Duration::from_secs(5)).unwrap();
    app(base_state().with_market_data(Arc::new(client)))
}

fn bearer(is_admin: bool) -> String {
    let claims = Claims::new(
        "9d8c7b6a-5f4e-4d3c-8b2a-1f0e9d8c7b6a",
        "member@example.com",
        is_admin,
        60,
    );
    format!("Bearer {}", create_token(&claims, SECRET).unwrap())
}

async fn call(
    app: Router,
    method: Method,
    uri: &str,
    auth: Option<String>,
    body: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (
        status,
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
    )
}

#[tokio::test]
async fn health_without_database_reports_not_connected() {
    let (status, json) = call(app(base_state()), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "not_connected");

    let (status, json) = call(app(base_state()), Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["components"]["database"]["status"], "not_configured");
    assert_eq!(json["components"]["market_data"]["status"], "not_configured");
}

#[tokio::test]
async fn market_endpoints_need_a_provider() {
    let (status, _) = call(
        app(base_state()),
        Method::GET,
        "/api/v1/markets/indices",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn movers_are_fetched_once_then_cached() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", SNAPSHOT_PATH)
        .match_query(Matcher::UrlEncoded("apikey".into(), "test-key".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status":"OK","tickers":[
                {"ticker":"NVDA","todaysChange":12.0,"todaysChangePerc":8.5,"day":{"c":150.0,"v":5000000}},
                {"ticker":"INTC","todaysChange":-1.5,"todaysChangePerc":-6.2,"day":{"c":22.0,"v":3000000}},
                {"ticker":"PENY","todaysChange":0.1,"todaysChangePerc":40.0,"day":{"c":0.5,"v":9000000}},
                {"ticker":"THIN","todaysChange":3.0,"todaysChangePerc":9.0,"day":{"c":30.0,"v":10}}
            ]}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let app = app_with_polygon(server.url());

    let (status, json) = call(
        app.clone(),
        Method::GET,
        "/api/v1/markets/movers?limit=5",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["cached"], false);
    assert_eq!(json["data"]["gainers"][0]["symbol"], "NVDA");
    assert_eq!(json["data"]["losers"][0]["symbol"], "INTC");
    // 페니 주식과 거래량 미달 종목은 제외
    assert_eq!(json["data"]["mostActive"].as_array().unwrap().len(), 2);

    let (status, json) = call(app, Method::GET, "/api/v1/markets/movers?limit=5", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["cached"], true);

    mock.assert_async().await;
}

#[tokio::test]
async fn indices_skip_failed_proxies() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", format!("{SNAPSHOT_PATH}/SPY").as_str())
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"status":"OK","ticker":{"ticker":"SPY",
                "todaysChange":2.5,"todaysChangePerc":0.45,
                "day":{"o":550.0,"h":556.0,"l":549.0,"c":555.0,"v":1000},
                "prevDay":{"c":552.5}}}"#,
        )
        .create_async()
        .await;
    server
        .mock(
            "GET",
            Matcher::Regex(format!("^{SNAPSHOT_PATH}/(DIA|QQQ|IWM|VIXY)$")),
        )
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let (status, json) = call(
        app_with_polygon(server.url()),
        Method::GET,
        "/api/v1/markets/indices",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["meta"]["count"], 1);
    assert_eq!(json["data"][0]["symbol"], "SPY");
    assert_eq!(json["data"][0]["dataType"], "etf_proxy");
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    for uri in [
        "/api/v1/admin/stocks",
        "/api/v1/admin/workers",
        "/api/v1/admin/notes/tree",
    ] {
        let (status, json) = call(app(base_state()), Method::GET, uri, Some(bearer(false)), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(json["error"], "Admin access required");
    }
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let token = bearer(true).replace("Bearer ", "Bearer x");
    let (status, _) = call(
        app(base_state()),
        Method::GET,
        "/api/v1/watchlists",
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_runs_before_database_lookup() {
    let (status, json) = call(
        app(base_state()),
        Method::POST,
        "/api/v1/watchlists",
        Some(bearer(false)),
        Some(r#"{"name":""}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Name must be between 1 and 255 characters");

    let (status, json) = call(
        app(base_state()),
        Method::POST,
        "/api/v1/admin/notes/features/6a5b4c3d-2e1f-4a0b-9c8d-7e6f5a4b3c2d/notes",
        Some(bearer(true)),
        Some(r#"{"section":"mobile","title":"x"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["error"],
        "Invalid section. Must be one of: ui, backend, data, infra"
    );
}

#[tokio::test]
async fn public_plans_need_database_but_not_login() {
    let (status, json) = call(
        app(base_state()),
        Method::GET,
        "/api/v1/subscriptions/plans",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Database not available");
}
