//! 외부 시세 제공자 추상화.
//!
//! 핸들러는 `MarketDataProvider` trait 객체에만 의존하므로 테스트에서
//! 고정 스냅샷을 돌려주는 구현으로 교체할 수 있습니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 시세 제공자 에러.
#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("market data request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("market data request failed with status: {0}")]
    Status(u16),

    #[error("market data API error: {0}")]
    Api(String),
}

/// 일봉 요약 (o/h/l/c/v).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DayBar {
    #[serde(rename = "o", default)]
    pub open: f64,
    #[serde(rename = "h", default)]
    pub high: f64,
    #[serde(rename = "l", default)]
    pub low: f64,
    #[serde(rename = "c", default)]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
}

/// 최근 체결.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LastTrade {
    #[serde(rename = "p", default)]
    pub price: f64,
    /// 나노초 단위 Unix 타임스탬프
    #[serde(rename = "t", default)]
    pub timestamp_ns: i64,
}

/// 종목 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    pub ticker: String,
    #[serde(default)]
    pub todays_change: f64,
    #[serde(default)]
    pub todays_change_perc: f64,
    #[serde(default)]
    pub day: DayBar,
    #[serde(default)]
    pub last_trade: LastTrade,
    #[serde(default)]
    pub prev_day: DayBar,
}

/// 단일 종목 실시간 시세.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    pub change: f64,
    pub change_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl TickerSnapshot {
    /// 스냅샷에서 현재 시세를 계산합니다.
    ///
    /// 현재가는 최근 체결가, 없으면 전일 종가입니다. 당일 시가가 있으면 시가 대비,
    /// 없으면(장 마감 후/휴장) 전일 종가 대비 변동을 계산합니다.
    pub fn to_quote(&self) -> StockQuote {
        let price = if self.last_trade.price != 0.0 {
            self.last_trade.price
        } else {
            self.prev_day.close
        };

        let market_open = self.day.open != 0.0;
        let bar = if market_open { self.day } else { self.prev_day };
        let base = if market_open {
            self.day.open
        } else {
            self.prev_day.close
        };

        let change = price - base;
        let change_percent = if base != 0.0 { change / base * 100.0 } else { 0.0 };

        let timestamp = if self.last_trade.timestamp_ns != 0 {
            DateTime::from_timestamp(self.last_trade.timestamp_ns / 1_000_000_000, 0)
                .unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        StockQuote {
            symbol: self.ticker.clone(),
            price,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume as i64,
            change,
            change_percent,
            timestamp,
        }
    }
}

/// 시세 제공자 trait.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// 제공자 이름 (응답 meta.source에 사용).
    fn name(&self) -> &str;

    /// 미국 주식 전 종목 스냅샷.
    async fn bulk_snapshot(&self) -> Result<Vec<TickerSnapshot>, MarketDataError>;

    /// 단일 종목 스냅샷.
    async fn ticker_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, MarketDataError>;

    /// 단일 종목 현재 시세.
    async fn quote(&self, symbol: &str) -> Result<StockQuote, MarketDataError> {
        Ok(self.ticker_snapshot(symbol).await?.to_quote())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(last: f64, day_open: f64, prev_close: f64) -> TickerSnapshot {
        TickerSnapshot {
            ticker: "SPY".to_string(),
            day: DayBar {
                open: day_open,
                high: day_open + 2.0,
                low: day_open - 2.0,
                close: 0.0,
                volume: 1_000_000.0,
            },
            last_trade: LastTrade {
                price: last,
                timestamp_ns: 1_700_000_000_000_000_000,
            },
            prev_day: DayBar {
                open: prev_close - 1.0,
                high: prev_close + 1.0,
                low: prev_close - 3.0,
                close: prev_close,
                volume: 2_000_000.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_quote_uses_day_open_when_market_open() {
        let quote = snapshot(110.0, 100.0, 95.0).to_quote();
        assert_eq!(quote.price, 110.0);
        assert_eq!(quote.change, 10.0);
        assert!((quote.change_percent - 10.0).abs() < 1e-9);
        assert_eq!(quote.volume, 1_000_000);
        assert_eq!(quote.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_quote_falls_back_to_prev_close() {
        let quote = snapshot(0.0, 0.0, 95.0).to_quote();
        assert_eq!(quote.price, 95.0);
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.change_percent, 0.0);
        assert_eq!(quote.high, 96.0);
    }

    #[test]
    fn test_snapshot_deserializes_vendor_json() {
        let json = r#"{
            "ticker": "AAPL",
            "todaysChange": 1.5,
            "todaysChangePerc": 0.8,
            "day": {"o": 190.0, "h": 192.0, "l": 189.0, "c": 191.5, "v": 5000000, "vw": 190.7},
            "lastTrade": {"p": 191.4, "s": 100, "t": 1700000000000000000, "x": 4},
            "prevDay": {"o": 188.0, "h": 190.5, "l": 187.0, "c": 190.0, "v": 4000000}
        }"#;
        let snap: TickerSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.ticker, "AAPL");
        assert_eq!(snap.day.close, 191.5);
        assert_eq!(snap.last_trade.price, 191.4);
        assert_eq!(snap.prev_day.close, 190.0);
    }
}
