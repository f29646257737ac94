//! Polygon.io REST 클라이언트.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use invest_core::MarketDataConfig;

use crate::metrics::record_vendor_request;

use super::market_data::{MarketDataError, MarketDataProvider, TickerSnapshot};

/// Polygon.io 스냅샷 API 클라이언트.
#[derive(Clone)]
pub struct PolygonClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkSnapshotResponse {
    status: String,
    #[serde(default)]
    tickers: Vec<TickerSnapshot>,
}

#[derive(Debug, Deserialize)]
struct SingleSnapshotResponse {
    status: String,
    ticker: Option<TickerSnapshot>,
}

impl PolygonClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// 설정에서 생성합니다. API 키가 없으면 `None`.
    pub fn from_config(config: &MarketDataConfig) -> Result<Option<Self>, MarketDataError> {
        match config.polygon_api_key.as_deref() {
            Some(key) if !key.is_empty() => Self::new(
                key,
                config.polygon_base_url.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketDataError::Status(response.status().as_u16()));
        }

        Ok(response.json::<T>().await?)
    }
}

impl PolygonClient {
    async fn fetch_bulk_snapshot(&self) -> Result<Vec<TickerSnapshot>, MarketDataError> {
        let body: BulkSnapshotResponse = self
            .get_json("/v2/snapshot/locale/us/markets/stocks/tickers")
            .await?;

        if body.status != "OK" {
            return Err(MarketDataError::Api(body.status));
        }
        tracing::debug!(count = body.tickers.len(), "Fetched bulk snapshot");
        Ok(body.tickers)
    }

    async fn fetch_ticker_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, MarketDataError> {
        let symbol = symbol.to_uppercase();
        let body: SingleSnapshotResponse = self
            .get_json(&format!(
                "/v2/snapshot/locale/us/markets/stocks/tickers/{}",
                symbol
            ))
            .await?;

        if body.status != "OK" {
            return Err(MarketDataError::Api(format!("{} for symbol {}", body.status, symbol)));
        }
        body.ticker
            .ok_or_else(|| MarketDataError::Api(format!("empty snapshot for symbol {}", symbol)))
    }
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    fn name(&self) -> &str {
        "polygon.io"
    }

    async fn bulk_snapshot(&self) -> Result<Vec<TickerSnapshot>, MarketDataError> {
        let result = self.fetch_bulk_snapshot().await;
        record_vendor_request(self.name(), "bulk_snapshot", result.is_ok());
        result
    }

    async fn ticker_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, MarketDataError> {
        let result = self.fetch_ticker_snapshot(symbol).await;
        record_vendor_request(self.name(), "ticker_snapshot", result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base_url: String) -> PolygonClient {
        PolygonClient::new("test-key", base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_from_config_without_key() {
        let config = MarketDataConfig::default();
        assert!(PolygonClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bulk_snapshot_parses_tickers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/snapshot/locale/us/markets/stocks/tickers")
            .match_query(Matcher::UrlEncoded("apikey".into(), "test-key".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"OK","count":2,"tickers":[
                    {"ticker":"AAPL","todaysChange":1.0,"todaysChangePerc":0.5,"day":{"c":190.0,"v":1000000}},
                    {"ticker":"MSFT","todaysChange":-2.0,"todaysChangePerc":-0.4,"day":{"c":410.0,"v":900000}}
                ]}"#,
            )
            .create_async()
            .await;

        let tickers = client(server.url()).bulk_snapshot().await.unwrap();
        mock.assert_async().await;
        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[1].ticker, "MSFT");
        assert_eq!(tickers[1].todays_change_perc, -0.4);
    }

    #[tokio::test]
    async fn test_non_ok_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/snapshot/locale/us/markets/stocks/tickers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"NOT_AUTHORIZED"}"#)
            .create_async()
            .await;

        let err = client(server.url()).bulk_snapshot().await.unwrap_err();
        assert!(matches!(err, MarketDataError::Api(ref s) if s == "NOT_AUTHORIZED"));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/snapshot/locale/us/markets/stocks/tickers/SPY")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;

        let err = client(server.url()).ticker_snapshot("spy").await.unwrap_err();
        assert!(matches!(err, MarketDataError::Status(429)));
    }

    #[tokio::test]
    async fn test_quote_from_single_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v2/snapshot/locale/us/markets/stocks/tickers/QQQ")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"status":"OK","ticker":{"ticker":"QQQ",
                    "day":{"o":400.0,"h":405.0,"l":398.0,"c":0,"v":100},
                    "lastTrade":{"p":404.0,"t":0},
                    "prevDay":{"c":399.0}}}"#,
            )
            .create_async()
            .await;

        let quote = client(server.url()).quote("qqq").await.unwrap();
        assert_eq!(quote.symbol, "QQQ");
        assert_eq!(quote.price, 404.0);
        assert_eq!(quote.change, 4.0);
    }
}
