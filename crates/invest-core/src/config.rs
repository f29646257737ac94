//! 설정 관리.
//!
//! 기본값 → 설정 파일(TOML) → `INVEST__` 접두 환경 변수 순서로 병합한 뒤,
//! 배포 환경에서 관례적으로 쓰이는 환경 변수(`DATABASE_URL`, `REDIS_URL` 등)를
//! 마지막으로 덮어씁니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// Redis 설정
    pub redis: RedisConfig,
    /// 인증 설정
    pub auth: AuthConfig,
    /// 외부 시세 API 설정
    pub market_data: MarketDataConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// CORS 설정
    pub cors: CorsConfig,
    /// Rate limit 설정
    pub rate_limit: RateLimitSettings,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// `host:port` 문자열.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 연결 URL (미설정 시 DB 기능 비활성화)
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connection_timeout_secs: 10,
        }
    }
}

/// Redis 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisConfig {
    /// 연결 URL (redis://[:password@]host:port/db)
    pub url: Option<String>,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            connection_timeout_secs: 5,
        }
    }
}

/// 인증 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT 서명 키
    pub jwt_secret: String,
    /// Access token 만료 (분)
    pub access_token_minutes: i64,
}

/// 개발용 기본 JWT 시크릿.
pub const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_token_minutes: 60,
        }
    }
}

impl AuthConfig {
    /// 개발용 기본 시크릿을 사용 중인지 확인.
    pub fn is_insecure_default(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

/// 외부 시세 API (Polygon) 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// API 기본 URL
    pub polygon_base_url: String,
    /// API 키 (미설정 시 시세 엔드포인트 503)
    pub polygon_api_key: Option<String>,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 급등락 종목 캐시 TTL (초)
    pub movers_cache_ttl_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            polygon_base_url: "https://api.polygon.io".to_string(),
            polygon_api_key: None,
            request_timeout_secs: 30,
            movers_cache_ttl_secs: 300,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "invest_api=info,tower_http=info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// CORS 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// 허용 origin 목록
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://investorcenter.ai".to_string(),
                "https://www.investorcenter.ai".to_string(),
            ],
        }
    }
}

/// Rate limit 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 비활성화 여부
    pub disabled: bool,
    /// 클라이언트 IP당 분당 요청 수
    pub requests_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            requests_per_minute: 1200,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("INVEST")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }

    /// 관례적인 환경 변수로 설정을 덮어씁니다.
    ///
    /// 조회 함수를 주입받아 테스트에서 프로세스 환경을 건드리지 않습니다.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty("API_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = Some(url);
        }

        if let Some(url) = non_empty("REDIS_URL") {
            self.redis.url = Some(url);
        } else if self.redis.url.is_none() {
            let addr = non_empty("REDIS_ADDR").unwrap_or_else(|| "localhost:6379".to_string());
            self.redis.url = Some(match non_empty("REDIS_PASSWORD") {
                Some(password) => format!("redis://:{}@{}", password, addr),
                None => format!("redis://{}", addr),
            });
        }

        if let Some(secret) = non_empty("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(key) = non_empty("POLYGON_API_KEY") {
            self.market_data.polygon_api_key = Some(key);
        }
        if let Some(origins) = non_empty("CORS_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.cors.allowed_origins = parsed;
            }
        }
        if let Some(rpm) = non_empty("RATE_LIMIT_RPM").and_then(|v| v.parse().ok()) {
            self.rate_limit.requests_per_minute = rpm;
        }
        if let Some(disabled) = non_empty("RATE_LIMIT_DISABLED") {
            self.rate_limit.disabled = disabled == "true" || disabled == "1";
        }
        if let Some(format) = non_empty("LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.database.url.is_none());
        assert!(config.auth.is_insecure_default());
        assert_eq!(config.cors.allowed_origins.len(), 3);
        assert_eq!(config.market_data.movers_cache_ttl_secs, 300);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/ic"),
            ("JWT_SECRET", "s3cret"),
            ("API_PORT", "9000"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("RATE_LIMIT_DISABLED", "1"),
        ]));

        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/ic"));
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert!(!config.auth.is_insecure_default());
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.rate_limit.disabled);
    }

    #[test]
    fn test_redis_addr_fallback() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[]));
        assert_eq!(config.redis.url.as_deref(), Some("redis://localhost:6379"));

        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[
            ("REDIS_ADDR", "cache:6380"),
            ("REDIS_PASSWORD", "pw"),
        ]));
        assert_eq!(config.redis.url.as_deref(), Some("redis://:pw@cache:6380"));
    }

    #[test]
    fn test_redis_url_takes_precedence() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[
            ("REDIS_URL", "redis://primary:6379/1"),
            ("REDIS_ADDR", "ignored:6379"),
        ]));
        assert_eq!(config.redis.url.as_deref(), Some("redis://primary:6379/1"));
    }

    #[test]
    fn test_invalid_port_is_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(lookup_from(&[("API_PORT", "not-a-port")]));
        assert_eq!(config.server.port, 8080);
    }
}
