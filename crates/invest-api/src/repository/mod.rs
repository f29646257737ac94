//! 데이터베이스 접근 계층.
//!
//! 각 Repository는 `&PgPool`을 받는 정적 메서드로 구성됩니다.

pub mod admin;
pub mod alerts;
pub mod financials;
pub mod notes;
pub mod notifications;
pub mod screener;
pub mod sentiment;
pub mod subscriptions;
pub mod task_types;
pub mod tasks;
pub mod tickers;
pub mod watchlists;
pub mod workers;

pub use admin::AdminRepository;
pub use alerts::AlertRepository;
pub use financials::FinancialsRepository;
pub use notes::NotesRepository;
pub use notifications::NotificationRepository;
pub use screener::ScreenerRepository;
pub use sentiment::SentimentRepository;
pub use subscriptions::SubscriptionRepository;
pub use task_types::TaskTypeRepository;
pub use tasks::TaskRepository;
pub use tickers::TickerRepository;
pub use watchlists::WatchlistRepository;
pub use workers::WorkerRepository;

use sqlx::{postgres::PgRow, FromRow};

/// 행을 디코딩합니다. 실패한 행은 경고를 남기고 건너뜁니다.
pub(crate) fn decode_rows<T>(rows: Vec<PgRow>, entity: &'static str) -> Vec<T>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    rows.iter()
        .filter_map(|row| match T::from_row(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(entity, error = %e, "Skipping row that failed to decode");
                None
            }
        })
        .collect()
}
