//! JWT 토큰 처리.
//!
//! 토큰 발급은 별도 인증 서비스가 담당하며, 이 모듈은 검증과
//! 테스트/운영 도구용 생성 함수만 제공합니다.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access token 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// 사용자 ID
    #[serde(alias = "user_id")]
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub jti: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "access".to_string()
}

impl Claims {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        is_admin: bool,
        expires_in_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.into(),
            email: email.into(),
            is_admin,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expires_in_minutes)).timestamp(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
            token_type: default_token_type(),
        }
    }
}

/// JWT 에러.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("토큰 인코딩 실패: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("토큰이 만료되었습니다")]
    Expired,
    #[error("유효하지 않은 토큰")]
    Invalid,
}

/// HS256으로 서명된 토큰을 생성합니다.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(JwtError::from)
}

/// 토큰을 검증하고 Claims를 반환합니다.
///
/// access 토큰만 허용합니다.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid,
    })?;

    if data.claims.token_type != "access" {
        return Err(JwtError::Invalid);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "jwt-test-secret";

    #[test]
    fn test_round_trip() {
        let claims = Claims::new("0b6c1f0e-4c7a-4bde-9f6e-1d2a3b4c5d6e", "a@b.com", true, 60);
        let token = create_token(&claims, SECRET).unwrap();
        let decoded = decode_token(&token, SECRET).unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.email, "a@b.com");
        assert!(decoded.is_admin);
    }

    #[test]
    fn test_expired_token() {
        let mut claims = Claims::new("u", "a@b.com", false, 60);
        claims.iat -= 7200;
        claims.exp = Utc::now().timestamp() - 3600;
        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(decode_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_secret_and_garbage() {
        let token = create_token(&Claims::new("u", "a@b.com", false, 60), SECRET).unwrap();
        assert!(matches!(decode_token(&token, "other"), Err(JwtError::Invalid)));
        assert!(matches!(
            decode_token("invalid.token.here", SECRET),
            Err(JwtError::Invalid)
        ));
    }

    #[test]
    fn test_refresh_token_rejected() {
        let mut claims = Claims::new("u", "a@b.com", false, 60);
        claims.token_type = "refresh".to_string();
        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(decode_token(&token, SECRET), Err(JwtError::Invalid)));
    }
}
