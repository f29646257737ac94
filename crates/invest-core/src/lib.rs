//! # Invest Core
//!
//! InvestorCenter API의 공통 기반 크레이트입니다.
//!
//! 이 크레이트는 API 서버 전반에서 사용되는 기본 요소를 제공합니다:
//! - 설정 관리 (파일 + 환경 변수)
//! - 로깅 인프라
//! - 공통 에러 타입
//! - 작업 큐, 노트, 구독, 감성 분석 도메인 열거형
//! - 알림 방해 금지 시간(quiet hours) 계산

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use self::config::*;
pub use self::domain::*;
pub use self::error::*;
pub use self::logging::*;
