//! 외부 시세 연동과 비즈니스 로직.
//!
//! - [`crypto`]: Redis 암호화폐 시세
//! - [`market_data`]: 시세 제공자 trait과 스냅샷 모델
//! - [`polygon`]: Polygon.io REST 클라이언트
//! - [`movers`]: 급등락 종목 선정과 캐시
//! - [`sentiment`]: 감성 스냅샷 가공
//! - [`watchlist`]: 관심 목록 시세 보강과 요약 지표

pub mod crypto;
pub mod market_data;
pub mod movers;
pub mod polygon;
pub mod sentiment;
pub mod watchlist;

pub use crypto::{CryptoQuote, CryptoQuoteError};
pub use market_data::{
    DayBar, LastTrade, MarketDataError, MarketDataProvider, StockQuote, TickerSnapshot,
};
pub use movers::{select_movers, MarketMovers, MoverStock, MoversCache};
pub use polygon::PolygonClient;
pub use sentiment::{group_history_by_day, top_subreddits, SentimentHistoryPoint, SubredditCount};
pub use watchlist::{attach_quotes, summarize, WatchListSummaryMetrics};
