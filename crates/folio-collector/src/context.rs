//! 작업 실행에 필요한 공유 자원 (DB 풀, API 클라이언트, 스토리지).

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use crate::client::{build_http_client, CardApiClient, CurrencyClient, TcgPlayerClient};
use crate::error::CollectorError;
use crate::storage::{ImageStore, S3ImageStore};
use crate::{CollectorConfig, Result};

/// 수집 작업 공유 컨텍스트
pub struct CollectorContext {
    pub pool: PgPool,
    pub config: CollectorConfig,
    /// 이미지 다운로드용 클라이언트
    pub http: reqwest::Client,
    pub card_api: CardApiClient,
    pub tcgplayer: TcgPlayerClient,
    pub currency: CurrencyClient,
    /// 스토리지 설정이 없으면 None
    pub images: Option<Arc<dyn ImageStore>>,
}

impl CollectorContext {
    /// DB 연결과 클라이언트 생성
    pub async fn connect(config: CollectorConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database_url)
            .await?;
        tracing::info!("데이터베이스 연결 성공");

        Self::with_pool(pool, config).await
    }

    /// 기존 풀로 컨텍스트 생성
    pub async fn with_pool(pool: PgPool, config: CollectorConfig) -> Result<Self> {
        let images: Option<Arc<dyn ImageStore>> = if config.storage.is_configured() {
            Some(Arc::new(S3ImageStore::from_config(&config.storage).await?))
        } else {
            tracing::info!("이미지 스토리지 미설정, 이미지 업로드 비활성화");
            None
        };

        Ok(Self {
            http: build_http_client(config.api.http_timeout())?,
            card_api: CardApiClient::from_config(&config.api)?,
            tcgplayer: TcgPlayerClient::from_config(&config.api)?,
            currency: CurrencyClient::from_config(&config.api)?,
            images,
            pool,
            config,
        })
    }

    /// 이미지 업로드가 필요한 작업용. 스토리지가 없으면 설정 에러.
    pub fn require_image_store(&self) -> Result<&dyn ImageStore> {
        self.images.as_deref().ok_or_else(|| {
            CollectorError::Config("이미지 업로드에 S3 설정이 필요합니다".to_string())
        })
    }
}
