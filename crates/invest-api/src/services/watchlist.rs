//! 관심 목록 상세 가공.
//!
//! 종목별 실시간 시세를 동시에 조회해 채우고, 목록 요약 지표를 계산합니다.
//! 시세 조회 실패는 경고만 남기고 해당 종목의 가격 필드를 비워 둡니다.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::repository::watchlists::WatchListItemDetail;
use crate::services::MarketDataProvider;

/// 동시 시세 조회 수 (제공자 rate limit 보호).
pub const MAX_CONCURRENT_QUOTES: usize = 5;

/// 관심 목록 요약 지표.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct WatchListSummaryMetrics {
    pub total_tickers: usize,
    pub avg_ic_score: Option<f64>,
    pub avg_day_change_pct: Option<f64>,
    pub avg_dividend_yield: Option<f64>,
    pub reddit_trending_count: usize,
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// 값이 있는 항목만으로 평균을 냅니다. Reddit 추세가 `rising`인 종목 수를 셉니다.
pub fn summarize(items: &[WatchListItemDetail]) -> WatchListSummaryMetrics {
    let ic_scores: Vec<f64> = items.iter().filter_map(|i| i.ic_score).collect();
    let day_changes: Vec<f64> = items.iter().filter_map(|i| i.price_change_pct).collect();
    let dividend_yields: Vec<f64> = items.iter().filter_map(|i| i.dividend_yield).collect();

    WatchListSummaryMetrics {
        total_tickers: items.len(),
        avg_ic_score: average(&ic_scores),
        avg_day_change_pct: average(&day_changes),
        avg_dividend_yield: average(&dividend_yields),
        reddit_trending_count: items
            .iter()
            .filter(|i| i.reddit_trend.as_deref() == Some("rising"))
            .count(),
    }
}

/// 종목별 시세를 채웁니다.
///
/// 변동이 0이면 변동/전일 종가 필드는 비워 두고, 거래량은 0보다 클 때만 채웁니다.
pub async fn attach_quotes(
    provider: Arc<dyn MarketDataProvider>,
    items: &mut [WatchListItemDetail],
) {
    if items.is_empty() {
        return;
    }

    let symbols: Vec<String> = items.iter().map(|i| i.item.symbol.clone()).collect();
    let quotes: Vec<_> = stream::iter(symbols.into_iter().enumerate())
        .map(|(idx, symbol)| {
            let provider = Arc::clone(&provider);
            async move {
                let result = provider.quote(&symbol).await;
                if let Err(e) = &result {
                    tracing::warn!(symbol = %symbol, error = %e, "Quote fetch failed for watch list item");
                }
                (idx, result.ok())
            }
        })
        .buffer_unordered(MAX_CONCURRENT_QUOTES)
        .collect()
        .await;

    for (idx, quote) in quotes {
        let (Some(quote), Some(item)) = (quote, items.get_mut(idx)) else {
            continue;
        };
        item.current_price = Some(quote.price);
        if quote.change != 0.0 {
            item.price_change = Some(quote.change);
            item.price_change_pct = Some(quote.change_percent);
            item.prev_close = Some(quote.price - quote.change);
        }
        if quote.volume > 0 {
            item.volume = Some(quote.volume);
        }
    }
}
