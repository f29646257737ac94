//! 공용 응답 타입.

pub mod response;

pub use response::{success, MessageResponse, StatusMessage, SuccessResponse, TimestampMeta};
