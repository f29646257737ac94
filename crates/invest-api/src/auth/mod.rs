//! 인증 및 권한 확인.
//!
//! - [`AuthUser`]: Bearer JWT 검증 추출기
//! - [`AdminUser`]: 관리자 전용
//! - [`WorkerUser`]: 워커 계정 전용 (DB 확인)

mod extractors;
mod jwt;
mod password;

pub use extractors::{AdminUser, AuthUser, WorkerUser};
pub use jwt::{create_token, decode_token, Claims, JwtError};
pub use password::{hash_password, PasswordError};
