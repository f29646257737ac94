//! 도메인 값 타입.
//!
//! DB에는 TEXT로 저장되고, 저장소 계층에서 `as_str` / `FromStr`로 변환합니다.

pub mod alert;
pub mod financials;
pub mod notes;
pub mod quiet_hours;
pub mod sentiment;
pub mod subscription;
pub mod task;

pub use alert::{AlertFrequency, AlertType};
pub use financials::{enrich_cash_flow, free_cash_flow, yoy_changes, StatementType, Timeframe};
pub use notes::NoteSection;
pub use quiet_hours::{parse_time_of_day, validate_timezone, QuietHours};
pub use sentiment::{PostSort, SentimentPeriod};
pub use subscription::{check_limit, BillingPeriod, LimitType, SubscriptionStatus, UNLIMITED};
pub use task::{TaskPriority, TaskStatus};
