//! 환경변수 기반 설정 모듈.

use crate::error::CollectorError;
use crate::Result;
use std::time::Duration;

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 커넥션 풀 설정
    pub database: DatabaseConfig,
    /// 외부 API 설정
    pub api: ApiConfig,
    /// 이미지 스토리지 설정
    pub storage: StorageConfig,
    /// 스케줄러 설정
    pub scheduler: SchedulerConfig,
}

/// 커넥션 풀 설정
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

/// 외부 API 설정
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// 카드 카탈로그 API 주소
    pub card_api_base_url: String,
    /// 카드 카탈로그 API 키 (없으면 비인증 요청)
    pub card_api_key: Option<String>,
    /// TCGPlayer API 주소
    pub tcgplayer_base_url: String,
    /// TCGPlayer public key
    pub tcgplayer_public_key: Option<String>,
    /// TCGPlayer private key
    pub tcgplayer_private_key: Option<String>,
    /// 환율 API 주소
    pub currency_base_url: String,
    /// 실드 상품 이미지 주소 접두사 (뒤에 `<상품 ID>.<확장자>`)
    pub sealed_image_base_url: String,
    /// HTTP 요청 타임아웃 (초)
    pub http_timeout_secs: u64,
    /// API 요청 간 딜레이 (밀리초)
    pub request_delay_ms: u64,
}

/// 이미지 스토리지 설정
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// S3 호환 엔드포인트 (없으면 AWS 기본값)
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// 메타데이터에 기록할 이미지 URL 접두사
    pub cdn_base_url: String,
    /// 업로드 객체의 Cache-Control 헤더
    pub cache_control: String,
}

/// 스케줄러 설정 (초 단위 포함 6필드 cron 표현식)
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 야간 수집 + 분석
    pub nightly_cron: String,
    /// 환율 수집
    pub currency_cron: String,
    /// 포트폴리오 스냅샷
    pub portfolio_cron: String,
    /// 야간 수집 시 이미지 업로드 여부
    pub upload_images: bool,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        Ok(Self {
            database_url,
            database: DatabaseConfig {
                max_connections: env_var_parse("DB_MAX_CONNECTIONS", 5),
            },
            api: ApiConfig {
                card_api_base_url: env_var_or("CARD_API_BASE_URL", "https://api.pokemontcg.io"),
                card_api_key: env_var_opt("PTCG_API_KEY"),
                tcgplayer_base_url: env_var_or("TCGP_BASE_URL", "https://api.tcgplayer.com"),
                tcgplayer_public_key: env_var_opt("TCGP_PUBLIC"),
                tcgplayer_private_key: env_var_opt("TCGP_PRIVATE"),
                currency_base_url: env_var_or("FX_BASE_URL", "https://api.fxratesapi.com"),
                sealed_image_base_url: env_var_or(
                    "SEALED_IMAGE_BASE_URL",
                    "https://public.getcollectr.com/public-assets/products/product_",
                ),
                http_timeout_secs: env_var_parse("HTTP_TIMEOUT_SECS", 30),
                request_delay_ms: env_var_parse("REQUEST_DELAY_MS", 250),
            },
            storage: StorageConfig {
                endpoint: env_var_opt("S3_ENDPOINT"),
                region: env_var_or("S3_REGION", "auto"),
                bucket: env_var_opt("S3_BUCKET"),
                access_key: env_var_opt("S3_ACCESS_KEY"),
                secret_key: env_var_opt("S3_SECRET_KEY"),
                cdn_base_url: env_var_or("CDN_BASE_URL", "https://cdn.pokefolio.co"),
                cache_control: env_var_or("IMAGE_CACHE_CONTROL", "public, max-age=31536000"),
            },
            scheduler: SchedulerConfig {
                nightly_cron: env_var_or("CRON_NIGHTLY", "0 0 3 * * *"),
                currency_cron: env_var_or("CRON_CURRENCY", "0 0 * * * *"),
                portfolio_cron: env_var_or("CRON_PORTFOLIO", "0 30 5 * * *"),
                upload_images: env_var_bool("SCHEDULE_UPLOAD_IMAGES", false),
            },
        })
    }
}

impl ApiConfig {
    /// API 요청 간 딜레이를 Duration으로 반환
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// HTTP 타임아웃을 Duration으로 반환
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl StorageConfig {
    /// 버킷과 자격 증명이 모두 설정되어 있는지
    pub fn is_configured(&self) -> bool {
        self.bucket.is_some() && self.access_key.is_some() && self.secret_key.is_some()
    }

    /// 오브젝트 키에 대한 공개 URL
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.cdn_base_url.trim_end_matches('/'), key)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// 빈 문자열은 미설정으로 취급
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_var_or(key: &str, default: &str) -> String {
    env_var_opt(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> StorageConfig {
        StorageConfig {
            endpoint: None,
            region: "auto".to_string(),
            bucket: Some("images".to_string()),
            access_key: None,
            secret_key: Some("secret".to_string()),
            cdn_base_url: "https://cdn.example.com/".to_string(),
            cache_control: "public".to_string(),
        }
    }

    #[test]
    fn test_public_url_trims_slash() {
        assert_eq!(
            storage().public_url("images/sv1/1.png"),
            "https://cdn.example.com/images/sv1/1.png"
        );
    }

    #[test]
    fn test_storage_requires_credentials() {
        let mut config = storage();
        assert!(!config.is_configured());
        config.access_key = Some("key".to_string());
        assert!(config.is_configured());
    }

    #[test]
    fn test_env_var_parse_falls_back() {
        std::env::set_var("FOLIO_TEST_BAD_NUMBER", "abc");
        assert_eq!(env_var_parse("FOLIO_TEST_BAD_NUMBER", 7u64), 7);
        std::env::set_var("FOLIO_TEST_BOOL", "1");
        assert!(env_var_bool("FOLIO_TEST_BOOL", false));
        std::env::set_var("FOLIO_TEST_EMPTY", "  ");
        assert_eq!(env_var_opt("FOLIO_TEST_EMPTY"), None);
    }
}
