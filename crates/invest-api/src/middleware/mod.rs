//! HTTP 미들웨어.

mod metrics;
mod rate_limit;

pub use metrics::metrics_layer;
pub use rate_limit::{
    rate_limit_middleware, spawn_cleanup_task, RateLimitConfig, RateLimitDecision, RateLimiter,
};
