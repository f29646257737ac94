//! 코어 에러 타입.
//!
//! 도메인 값 파싱과 설정 로드에서 발생하는 에러입니다. API 계층은
//! `InvalidInput`의 메시지를 그대로 400 응답 본문에 사용합니다.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("configuration error: {0}")]
    Config(String),

    /// 잘못된 입력 (메시지는 클라이언트에 그대로 노출)
    #[error("{0}")]
    InvalidInput(String),

    /// 알 수 없는 타임존
    #[error("unknown timezone: {0}")]
    Timezone(String),

    /// 시각 문자열 파싱 실패 (HH:MM[:SS])
    #[error("invalid time of day: {0}")]
    TimeOfDay(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// 클라이언트 입력 때문에 발생한 에러인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::Timezone(_) | Self::TimeOfDay(_)
        )
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
