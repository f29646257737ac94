//! Redis에 적재된 암호화폐 실시간 시세 조회.
//!
//! 수집기가 `crypto:quote:{SYMBOL}`에 JSON 시세를, `crypto:symbols:ranked`
//! sorted set에 순위별 심볼을 기록합니다. 이 모듈은 읽기만 합니다.

use redis::{aio::ConnectionManager, AsyncCommands, RedisError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// 순위별 심볼 sorted set.
pub const RANKED_SYMBOLS_KEY: &str = "crypto:symbols:ranked";

/// 스트림 기본 심볼.
pub const DEFAULT_STREAM_SYMBOLS: &[&str] = &[
    "BTC", "ETH", "BNB", "XRP", "SOL", "ADA", "DOGE", "MATIC", "DOT", "SHIB",
];

/// 시세 키.
pub fn quote_key(symbol: &str) -> String {
    format!("crypto:quote:{}", symbol.to_uppercase())
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

/// 암호화폐 시세.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct CryptoQuote {
    pub symbol: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub price: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub price_btc: f64,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub rank: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub change_1h: f64,
    pub change_24h: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub change_7d: f64,
    pub volume_24h: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub market_cap: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub circulating_supply: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_supply: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub max_supply: f64,
    pub last_updated: String,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub update_interval: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tier: String,
    pub source: String,
}

impl CryptoQuote {
    /// 24시간 변동 금액.
    pub fn change_amount_24h(&self) -> f64 {
        self.price * self.change_24h / 100.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoQuoteError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("invalid quote payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// 단일 시세. 키가 없으면 `None`.
pub async fn fetch_quote(
    conn: &mut ConnectionManager,
    symbol: &str,
) -> Result<Option<CryptoQuote>, CryptoQuoteError> {
    let raw: Option<String> = conn.get(quote_key(symbol)).await?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// 여러 시세를 파이프라인으로 조회합니다. 없거나 깨진 시세는 건너뜁니다.
///
/// 결과 키는 요청한 심볼 그대로입니다.
pub async fn fetch_quotes(
    conn: &mut ConnectionManager,
    symbols: &[String],
) -> BTreeMap<String, CryptoQuote> {
    if symbols.is_empty() {
        return BTreeMap::new();
    }

    let mut pipe = redis::pipe();
    for symbol in symbols {
        pipe.get(quote_key(symbol));
    }

    let values: Vec<Option<String>> = match pipe.query_async(conn).await {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!(error = %e, "Crypto quote pipeline failed");
            return BTreeMap::new();
        }
    };

    symbols
        .iter()
        .zip(values)
        .filter_map(|(symbol, raw)| {
            let quote = serde_json::from_str::<CryptoQuote>(raw.as_deref()?).ok()?;
            Some((symbol.clone(), quote))
        })
        .collect()
}

/// 순위 목록의 모든 시세.
pub async fn fetch_ranked_quotes(
    conn: &mut ConnectionManager,
) -> Result<BTreeMap<String, CryptoQuote>, RedisError> {
    let symbols: Vec<String> = conn.zrange(RANKED_SYMBOLS_KEY, 0, -1).await?;
    Ok(fetch_quotes(conn, &symbols).await)
}

/// 스트림 이벤트 본문: `{SYM: {price, change}}`.
pub fn stream_payload(quotes: &BTreeMap<String, CryptoQuote>) -> Value {
    let map: Map<String, Value> = quotes
        .iter()
        .map(|(symbol, quote)| {
            (
                symbol.clone(),
                json!({ "price": quote.price, "change": quote.change_24h }),
            )
        })
        .collect();
    Value::Object(map)
}
