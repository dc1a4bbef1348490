//! 데이터 수집 모듈.

pub mod analysis;
pub mod card_prices;
pub mod cards;
pub mod currency_rates;
pub mod portfolio_values;
pub mod price_map;
pub mod price_log;
pub mod sealed_images;
pub mod sealed_prices;
pub mod sets;

pub use analysis::{list_tracking, run_all_analyses, run_analysis, AnalysisKind};
pub use card_prices::collect_card_prices;
pub use cards::{collect_cards, CardCollectOptions};
pub use currency_rates::collect_currency_rates;
pub use portfolio_values::collect_portfolio_values;
pub use price_map::{collect_price_map, PriceMapOptions};
pub use sealed_images::{collect_sealed_images, SealedImageOptions};
pub use sealed_prices::collect_sealed_prices;
pub use sets::{collect_sets, SetCollectOptions};

use sqlx::PgPool;

use crate::client::ApiCard;
use crate::context::CollectorContext;
use crate::storage::{transfer_image, ImageStore, ImageUpload};
use crate::{CollectionStats, Result};

/// 세트 목록 (최신 발매순)
pub(crate) async fn list_set_ids(pool: &PgPool) -> Result<Vec<String>> {
    let sets: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT setid
        FROM pfdata_sets
        ORDER BY releaseddate DESC NULLS LAST, setid
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(sets)
}

/// 세트의 전체 카드 조회. 첫 페이지 조회 실패는 에러, 이후 페이지 실패는 에러 수에만 반영합니다.
pub(crate) async fn fetch_set_cards(
    ctx: &CollectorContext,
    set_id: &str,
    stats: &mut CollectionStats,
) -> Result<Vec<ApiCard>> {
    let first = ctx.card_api.fetch_cards_page(set_id, 1).await?;
    let pages = first.total_pages();
    let mut cards = first.data;

    for page in 2..=pages {
        tokio::time::sleep(ctx.config.api.request_delay()).await;
        match ctx.card_api.fetch_cards_page(set_id, page).await {
            Ok(next) => cards.extend(next.data),
            Err(e) => {
                stats.record_error();
                tracing::warn!(set_id, page, error = %e, "카드 페이지 조회 실패");
            }
        }
    }

    Ok(cards)
}

/// 이미지 일괄 업로드. 개별 실패는 에러 수에만 반영합니다.
pub(crate) async fn upload_images(
    http: &reqwest::Client,
    store: &dyn ImageStore,
    uploads: &[ImageUpload],
    stats: &mut CollectionStats,
) {
    for upload in uploads {
        match transfer_image(http, store, upload).await {
            Ok(()) => stats.images_uploaded += 1,
            Err(e) => {
                stats.record_error();
                tracing::warn!(
                    key = %upload.key,
                    source = %upload.download_from,
                    error = %e,
                    "이미지 업로드 실패"
                );
            }
        }
    }
}
