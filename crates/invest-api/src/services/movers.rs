//! 급등/급락/거래량 상위 종목 선정과 메모리 캐시.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use super::market_data::TickerSnapshot;

/// 거래량 하한.
const MIN_VOLUME: f64 = 100_000.0;
/// 가격 하한 (페니 주식 제외).
const MIN_PRICE: f64 = 1.0;
/// 변동률 상한 (데이터 오류로 간주).
const MAX_ABS_CHANGE_PERCENT: f64 = 100.0;

/// 급등락 종목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoverStock {
    pub symbol: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: f64,
}

/// 선정 결과.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarketMovers {
    pub gainers: Vec<MoverStock>,
    pub losers: Vec<MoverStock>,
    pub most_active: Vec<MoverStock>,
}

impl MarketMovers {
    /// 이름 조회가 필요한 심볼 (중복 제거).
    pub fn symbols(&self) -> Vec<String> {
        self.iter()
            .map(|m| m.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 회사명을 채웁니다. 없는 심볼은 그대로 둡니다.
    pub fn apply_names(&mut self, names: &HashMap<String, String>) {
        for mover in self
            .gainers
            .iter_mut()
            .chain(self.losers.iter_mut())
            .chain(self.most_active.iter_mut())
        {
            if let Some(name) = names.get(&mover.symbol) {
                mover.name = name.clone();
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = &MoverStock> {
        self.gainers
            .iter()
            .chain(self.losers.iter())
            .chain(self.most_active.iter())
    }
}

/// 스냅샷을 정제하여 후보 종목으로 변환합니다.
fn to_candidate(snapshot: &TickerSnapshot) -> Option<MoverStock> {
    // 장 마감 후에는 종가, 장중에는 최근 체결가
    let price = if snapshot.day.close != 0.0 {
        snapshot.day.close
    } else {
        snapshot.last_trade.price
    };
    let pct = snapshot.todays_change_perc;

    if price <= 0.0 || !pct.is_finite() {
        return None;
    }
    if pct.abs() > MAX_ABS_CHANGE_PERCENT
        || snapshot.day.volume < MIN_VOLUME
        || price < MIN_PRICE
    {
        return None;
    }

    Some(MoverStock {
        symbol: snapshot.ticker.clone(),
        name: String::new(),
        price,
        change: snapshot.todays_change,
        change_percent: pct,
        volume: snapshot.day.volume,
    })
}

/// 전 종목 스냅샷에서 상위 종목을 선정합니다.
pub fn select_movers(snapshots: &[TickerSnapshot], limit: usize) -> MarketMovers {
    let mut stocks: Vec<MoverStock> = snapshots.iter().filter_map(to_candidate).collect();

    stocks.sort_by(|a, b| b.change_percent.total_cmp(&a.change_percent));

    let gainers = stocks
        .iter()
        .filter(|s| s.change_percent > 0.0)
        .take(limit)
        .cloned()
        .collect();
    let losers = stocks
        .iter()
        .rev()
        .filter(|s| s.change_percent < 0.0)
        .take(limit)
        .cloned()
        .collect();

    stocks.sort_by(|a, b| b.volume.total_cmp(&a.volume));
    let most_active = stocks.into_iter().take(limit).collect();

    MarketMovers {
        gainers,
        losers,
        most_active,
    }
}

struct CacheEntry {
    movers: MarketMovers,
    stored_at: Instant,
}

/// limit별 급등락 결과 캐시.
pub struct MoversCache {
    ttl: Duration,
    entries: RwLock<HashMap<usize, CacheEntry>>,
}

impl MoversCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 만료되지 않은 캐시 항목을 반환합니다.
    pub async fn get(&self, limit: usize) -> Option<MarketMovers> {
        let entries = self.entries.read().await;
        entries
            .get(&limit)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.movers.clone())
    }

    pub async fn set(&self, limit: usize, movers: MarketMovers) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        entries.insert(
            limit,
            CacheEntry {
                movers,
                stored_at: Instant::now(),
            },
        );
    }
}

impl Default for MoversCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::market_data::{DayBar, LastTrade};

    fn snap(ticker: &str, close: f64, last: f64, pct: f64, volume: f64) -> TickerSnapshot {
        TickerSnapshot {
            ticker: ticker.to_string(),
            todays_change: close * pct / 100.0,
            todays_change_perc: pct,
            day: DayBar {
                close,
                volume,
                ..Default::default()
            },
            last_trade: LastTrade {
                price: last,
                timestamp_ns: 0,
            },
            prev_day: DayBar::default(),
        }
    }

    #[test]
    fn test_filters_invalid_rows() {
        let snapshots = vec![
            snap("ZERO", 0.0, 0.0, 5.0, 1e6),
            snap("NAN", 10.0, 0.0, f64::NAN, 1e6),
            snap("INF", 10.0, 0.0, f64::INFINITY, 1e6),
            snap("WILD", 10.0, 0.0, 150.0, 1e6),
            snap("THIN", 10.0, 0.0, 5.0, 99_999.0),
            snap("PENNY", 0.5, 0.0, 5.0, 1e6),
            snap("OK", 10.0, 0.0, 5.0, 1e6),
        ];

        let movers = select_movers(&snapshots, 5);
        assert_eq!(movers.gainers.len(), 1);
        assert_eq!(movers.gainers[0].symbol, "OK");
        assert_eq!(movers.most_active.len(), 1);
        assert!(movers.losers.is_empty());
    }

    #[test]
    fn test_uses_last_trade_when_close_missing() {
        let movers = select_movers(&[snap("LIVE", 0.0, 42.0, 1.0, 2e5)], 5);
        assert_eq!(movers.gainers[0].price, 42.0);
    }

    #[test]
    fn test_ordering_and_limit() {
        let snapshots = vec![
            snap("A", 10.0, 0.0, 3.0, 1e6),
            snap("B", 10.0, 0.0, 9.0, 2e6),
            snap("C", 10.0, 0.0, -4.0, 5e6),
            snap("D", 10.0, 0.0, -8.0, 3e5),
            snap("E", 10.0, 0.0, 0.0, 9e6),
        ];

        let movers = select_movers(&snapshots, 2);
        let syms = |v: &[MoverStock]| v.iter().map(|m| m.symbol.clone()).collect::<Vec<_>>();

        assert_eq!(syms(&movers.gainers), vec!["B", "A"]);
        assert_eq!(syms(&movers.losers), vec!["D", "C"]);
        assert_eq!(syms(&movers.most_active), vec!["E", "C"]);
    }

    #[test]
    fn test_apply_names() {
        let mut movers = select_movers(&[snap("AAPL", 190.0, 0.0, 1.0, 1e6)], 5);
        let names = HashMap::from([("AAPL".to_string(), "Apple Inc.".to_string())]);
        movers.apply_names(&names);
        assert_eq!(movers.gainers[0].name, "Apple Inc.");
        assert_eq!(movers.most_active[0].name, "Apple Inc.");
        assert_eq!(movers.symbols(), vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_empty_name_is_omitted() {
        let mover = MoverStock {
            symbol: "X".to_string(),
            name: String::new(),
            price: 1.0,
            change: 0.1,
            change_percent: 10.0,
            volume: 1e6,
        };
        let json = serde_json::to_value(&mover).unwrap();
        assert!(json.get("name").is_none());
        assert!(json.get("changePercent").is_some());
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MoversCache::new(Duration::from_millis(50));
        cache.set(5, MarketMovers::default()).await;
        assert!(cache.get(5).await.is_some());
        assert!(cache.get(10).await.is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(5).await.is_none());
    }
}
