//! 실드 상품 이미지 업로드.
//!
//! 상품 이미지 CDN에서 WebP로 변환된 이미지를 받아 스토리지에 올립니다.
//! 원본 확장자(`png`, `jpg`)를 순서대로 시도하고 처음 성공한 것만 저장합니다.

use folio_core::InvocationMethod;
use sqlx::PgPool;

use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::storage::{sealed_image_key, transfer_image, ImageStore, ImageUpload, WEBP_CONTENT_TYPE};
use crate::{CollectionStats, CollectorError, Result};

pub const JOB_NAME: &str = "collectSealedImages";

/// CDN에 있을 수 있는 원본 확장자 (시도 순서)
pub const SOURCE_FORMATS: [&str; 2] = ["png", "jpg"];

/// CDN 변환 옵션
const CDN_QUERY: &str = "optimizer=image&format=webp&width=1200&quality=70&strip=metadata";

#[derive(Debug, Clone, Default)]
pub struct SealedImageOptions {
    pub set_id: Option<String>,
}

/// 상품 하나의 업로드 후보 (시도 순서)
pub fn sealed_image_candidates(base_url: &str, set_id: &str, tcgp_id: i64) -> Vec<ImageUpload> {
    let key = sealed_image_key(set_id, tcgp_id);
    SOURCE_FORMATS
        .iter()
        .map(|format| {
            ImageUpload::new(format!("{}{}.{}?{}", base_url, tcgp_id, format, CDN_QUERY), &key)
                .with_content_type(WEBP_CONTENT_TYPE)
        })
        .collect()
}

/// 후보를 순서대로 시도합니다. 모두 실패하면 마지막 에러.
pub async fn transfer_first(
    http: &reqwest::Client,
    store: &dyn ImageStore,
    candidates: &[ImageUpload],
) -> Result<()> {
    let mut last_error = CollectorError::DataSource("업로드 후보 없음".to_string());
    for upload in candidates {
        match transfer_image(http, store, upload).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(source = %upload.download_from, error = %e, "이미지 후보 실패");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// 실드 이미지 업로드 작업
pub async fn collect_sealed_images(
    ctx: &CollectorContext,
    options: SealedImageOptions,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_sealed_images(ctx, &options, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_sealed_images(
    ctx: &CollectorContext,
    options: &SealedImageOptions,
    stats: &mut CollectionStats,
) -> Result<()> {
    let store = ctx.require_image_store()?;
    let sets = match &options.set_id {
        Some(set_id) => vec![set_id.clone()],
        None => super::list_set_ids(&ctx.pool).await?,
    };
    stats.total = sets.len();
    tracing::info!(sets = sets.len(), "실드 이미지 업로드 시작");

    for set_id in &sets {
        let products = match load_product_ids(&ctx.pool, set_id).await {
            Ok(products) => products,
            Err(e) => {
                stats.record_error();
                tracing::error!(set_id = %set_id, error = %e, "실드 상품 조회 실패");
                continue;
            }
        };
        if products.is_empty() {
            stats.empty += 1;
            continue;
        }

        let before = stats.images_uploaded;
        for tcgp_id in products {
            let candidates =
                sealed_image_candidates(&ctx.config.api.sealed_image_base_url, set_id, tcgp_id);
            match transfer_first(&ctx.http, store, &candidates).await {
                Ok(()) => stats.images_uploaded += 1,
                Err(e) => {
                    stats.record_error();
                    tracing::warn!(set_id = %set_id, tcgp_id, error = %e, "실드 이미지 업로드 실패");
                }
            }
        }

        stats.success += 1;
        tracing::info!(
            set_id = %set_id,
            uploaded = stats.images_uploaded - before,
            "세트 실드 이미지 업로드 완료"
        );
    }

    Ok(())
}

async fn load_product_ids(pool: &PgPool, set_id: &str) -> Result<Vec<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT tcgp_id::bigint
        FROM pf_sealed
        WHERE setid = $1
          AND tcgp_id IS NOT NULL
        ORDER BY 1
        "#,
    )
    .bind(set_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::RecordingStore;
    use mockito::Matcher;
    use std::time::Duration;

    #[test]
    fn test_candidates_try_png_then_jpg() {
        let candidates = sealed_image_candidates("https://cdn/product_", "other", 502000);
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].download_from.starts_with("https://cdn/product_502000.png?"));
        assert!(candidates[1].download_from.starts_with("https://cdn/product_502000.jpg?"));
        assert!(candidates
            .iter()
            .all(|c| c.key == "images/other/sealed/502000.webp" && c.content_type == WEBP_CONTENT_TYPE));
    }

    #[tokio::test]
    async fn test_transfer_first_falls_back_to_jpg() {
        let mut server = mockito::Server::new_async().await;
        let png = server
            .mock("GET", "/product_7.png")
            .match_query(Matcher::UrlEncoded("format".into(), "webp".into()))
            .with_status(404)
            .create_async()
            .await;
        let jpg = server
            .mock("GET", "/product_7.jpg")
            .match_query(Matcher::UrlEncoded("format".into(), "webp".into()))
            .with_status(200)
            .with_body("RIFFWEBP")
            .create_async()
            .await;

        let http = crate::client::build_http_client(Duration::from_secs(5)).unwrap();
        let store = RecordingStore::default();
        let candidates = sealed_image_candidates(&format!("{}/product_", server.url()), "sv1", 7);

        transfer_first(&http, &store, &candidates).await.unwrap();

        png.assert_async().await;
        jpg.assert_async().await;
        assert_eq!(
            store.uploads.lock().unwrap().as_slice(),
            &[("images/sv1/sealed/7.webp".to_string(), 8, "image/webp".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transfer_first_all_missing_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", Matcher::Regex(r"^/product_9\.(png|jpg)$".to_string()))
            .match_query(Matcher::Any)
            .with_status(404)
            .expect(2)
            .create_async()
            .await;

        let http = crate::client::build_http_client(Duration::from_secs(5)).unwrap();
        let store = RecordingStore::default();
        let candidates = sealed_image_candidates(&format!("{}/product_", server.url()), "sv1", 9);

        let err = transfer_first(&http, &store, &candidates).await.unwrap_err();
        assert!(matches!(err, CollectorError::DataSource(_)));
        assert!(store.uploads.lock().unwrap().is_empty());
    }
}
