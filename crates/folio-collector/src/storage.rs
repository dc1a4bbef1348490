//! 이미지 오브젝트 스토리지.
//!
//! 외부 API의 이미지를 내려받아 S3 호환 스토리지에 공개 객체로 올립니다.
//! 메타데이터에는 CDN 주소가 기록됩니다 (`StorageConfig::public_url`).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;

use crate::config::StorageConfig;
use crate::error::CollectorError;
use crate::Result;

/// 업로드 이미지의 기본 Content-Type
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

pub const WEBP_CONTENT_TYPE: &str = "image/webp";

/// 이미지 업로드 대상
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// `key` 위치에 이미지를 저장합니다.
    async fn put_image(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// 내려받을 이미지와 저장 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub download_from: String,
    pub key: String,
    pub content_type: &'static str,
}

impl ImageUpload {
    pub fn new(download_from: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            download_from: download_from.into(),
            key: key.into(),
            content_type: IMAGE_CONTENT_TYPE,
        }
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }
}

/// 세트 심볼 이미지 키
pub fn set_symbol_key(set_id: &str) -> String {
    format!("images/{}/symbol.png", set_id)
}

/// 세트 로고 이미지 키
pub fn set_logo_key(set_id: &str) -> String {
    format!("images/{}/logo.png", set_id)
}

/// 실드 상품 이미지 키
pub fn sealed_image_key(set_id: &str, tcgp_id: i64) -> String {
    format!("images/{}/sealed/{}.webp", set_id, tcgp_id)
}

/// 카드 이미지 키 (`hires`면 고해상도)
pub fn card_image_key(set_id: &str, number: &str, hires: bool) -> String {
    if hires {
        format!("images/{}/{}_hires.png", set_id, number)
    } else {
        format!("images/{}/{}.png", set_id, number)
    }
}

/// 이미지를 내려받아 스토리지에 저장합니다.
pub async fn transfer_image(
    http: &reqwest::Client,
    store: &dyn ImageStore,
    upload: &ImageUpload,
) -> Result<()> {
    let response = http.get(&upload.download_from).send().await?;
    let response = crate::client::ensure_success("이미지", response).await?;
    let body = response.bytes().await?;

    store
        .put_image(&upload.key, body.to_vec(), upload.content_type)
        .await
}

/// S3 호환 스토리지 (DigitalOcean Spaces, R2, MinIO 등)
pub struct S3ImageStore {
    client: S3Client,
    bucket: String,
    cache_control: String,
}

impl S3ImageStore {
    /// 설정에서 스토리지 클라이언트 생성.
    ///
    /// 버킷이나 자격 증명이 없으면 설정 에러를 반환합니다.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let (Some(bucket), Some(access_key), Some(secret_key)) =
            (&config.bucket, &config.access_key, &config.secret_key)
        else {
            return Err(CollectorError::Config(
                "S3_BUCKET / S3_ACCESS_KEY / S3_SECRET_KEY 환경변수가 설정되지 않았습니다"
                    .to_string(),
            ));
        };

        let credentials = Credentials::new(access_key, secret_key, None, None, "folio-collector");
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            s3_config = s3_config.endpoint_url(endpoint);
        }

        tracing::info!(bucket = %bucket, endpoint = ?config.endpoint, "이미지 스토리지 연결");

        Ok(Self {
            client: S3Client::from_conf(s3_config.build()),
            bucket: bucket.clone(),
            cache_control: config.cache_control.clone(),
        })
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put_image(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .cache_control(&self.cache_control)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| CollectorError::Storage(format!("{}: {}", key, e)))?;

        tracing::debug!(key, "이미지 업로드 완료");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 업로드 내역을 기록하는 테스트용 스토리지
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub uploads: Mutex<Vec<(String, usize, String)>>,
    }

    #[async_trait]
    impl ImageStore for RecordingStore {
        async fn put_image(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
            self.uploads
                .lock()
                .unwrap()
                .push((key.to_string(), body.len(), content_type.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_image_keys() {
        assert_eq!(set_symbol_key("sv1"), "images/sv1/symbol.png");
        assert_eq!(set_logo_key("sv1"), "images/sv1/logo.png");
        assert_eq!(card_image_key("sv1", "25", false), "images/sv1/25.png");
        assert_eq!(card_image_key("sv1", "25", true), "images/sv1/25_hires.png");
        assert_eq!(sealed_image_key("other", 502000), "images/other/sealed/502000.webp");
    }

    #[tokio::test]
    async fn test_transfer_image_downloads_and_stores() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/sv1/25.png")
            .with_status(200)
            .with_body(vec![0x89, b'P', b'N', b'G'])
            .create_async()
            .await;

        let http = crate::client::build_http_client(Duration::from_secs(5)).unwrap();
        let store = RecordingStore::default();
        let upload = ImageUpload::new(format!("{}/sv1/25.png", server.url()), "images/sv1/25.png");

        transfer_image(&http, &store, &upload).await.unwrap();

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(
            uploads.as_slice(),
            &[("images/sv1/25.png".to_string(), 4, "image/png".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transfer_image_missing_source_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let http = crate::client::build_http_client(Duration::from_secs(5)).unwrap();
        let store = RecordingStore::default();
        let upload = ImageUpload::new(format!("{}/missing.png", server.url()), "images/x.png");

        assert!(transfer_image(&http, &store, &upload).await.is_err());
        assert!(store.uploads.lock().unwrap().is_empty());
    }
}
