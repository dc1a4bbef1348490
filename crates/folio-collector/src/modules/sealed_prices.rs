//! 실드 상품 시세 수집 (TCGPlayer → `pf_sealed_price_history`).
//!
//! 카드 시세와 같은 흐름이지만 상품에는 변형이 없으므로 상품 ID만으로
//! 대응시킵니다.

use chrono::{NaiveDate, Utc};
use folio_core::InvocationMethod;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::price_log::{
    fetch_price_chunks, PriceUpdateLog, SetPriceProgress, SEALED_PRICE_LOG,
};
use crate::client::tcgplayer::PRODUCT_CHUNK_SIZE;
use crate::client::TcgPrice;
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectSealedPrices";

pub const PRICE_SOURCE: &str = "tcgplayer";

/// TCGPlayer 상품이 연결된 실드 상품
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedProduct {
    pub sealedid: String,
    pub tcgp_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPriceRecord {
    pub sealedid: String,
    pub price: Decimal,
}

/// 시세 응답을 실드 상품에 대응시킵니다. 상품당 첫 시세만 사용합니다.
pub fn match_sealed_prices(
    products: &[SealedProduct],
    prices: &[TcgPrice],
    progress: &mut SetPriceProgress,
) -> Vec<SealedPriceRecord> {
    let by_id: BTreeMap<i64, &SealedProduct> = products
        .iter()
        .rev()
        .map(|p| (p.tcgp_id, p))
        .collect();
    let mut records: BTreeMap<String, SealedPriceRecord> = BTreeMap::new();

    for price in prices {
        let Some(product) = by_id.get(&price.product_id) else {
            progress
                .flagged
                .skipped
                .push(format!("No product found - TCG ID: {}", price.product_id));
            continue;
        };
        let Some(market) = price.market_price else {
            progress.flagged.null_price.push(format!(
                "Null price - Product: {}, TCG ID: {}",
                product.name, product.tcgp_id
            ));
            continue;
        };

        records
            .entry(product.sealedid.clone())
            .or_insert_with(|| SealedPriceRecord {
                sealedid: product.sealedid.clone(),
                price: market,
            });
    }

    records.into_values().collect()
}

/// 실드 시세 수집 작업
pub async fn collect_sealed_prices(
    ctx: &CollectorContext,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_sealed_prices(ctx, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_sealed_prices(ctx: &CollectorContext, stats: &mut CollectionStats) -> Result<()> {
    let sets = super::list_set_ids(&ctx.pool).await?;
    let token = ctx.tcgplayer.access_token().await?;
    let mut log = PriceUpdateLog::start(&ctx.pool, SEALED_PRICE_LOG, sets.len()).await?;
    let today = Utc::now().date_naive();

    stats.total = sets.len();
    tracing::info!(sets = sets.len(), date = %today, "실드 시세 수집 시작");

    for (index, set_id) in sets.iter().enumerate() {
        match collect_set_prices(ctx, &token, set_id, today, stats).await {
            Ok(Some(progress)) => {
                stats.success += 1;
                log.record(&ctx.pool, set_id, index + 1, progress).await;
            }
            Ok(None) => stats.empty += 1,
            Err(e) => {
                stats.record_error();
                tracing::error!(set_id = %set_id, error = %e, "세트 실드 시세 수집 실패");
            }
        }
    }

    log.finish(&ctx.pool).await;
    Ok(())
}

async fn collect_set_prices(
    ctx: &CollectorContext,
    token: &str,
    set_id: &str,
    today: NaiveDate,
    stats: &mut CollectionStats,
) -> Result<Option<SetPriceProgress>> {
    let products = load_products(&ctx.pool, set_id).await?;
    if products.is_empty() {
        return Ok(None);
    }

    let mut progress = SetPriceProgress {
        total_records: products.len(),
        ..Default::default()
    };
    let mut product_ids: Vec<i64> = products.iter().map(|p| p.tcgp_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    let prices = fetch_price_chunks(
        &ctx.tcgplayer,
        token,
        &product_ids,
        PRODUCT_CHUNK_SIZE,
        ctx.config.api.request_delay(),
        set_id,
        stats,
        &mut progress,
    )
    .await;

    let records = match_sealed_prices(&products, &prices, &mut progress);
    stats.skipped += progress.flagged.skipped.len() + progress.flagged.null_price.len();

    match insert_price_history(&ctx.pool, &records, today).await {
        Ok(written) => {
            progress.inserted = written;
            stats.rows_written += written;
        }
        Err(e) => {
            stats.record_error();
            progress.failed += records.len();
            progress
                .flagged
                .failed
                .push(format!("Failed to insert {} prices: {}", records.len(), e));
            tracing::warn!(set_id, error = %e, "실드 시세 이력 저장 실패");
        }
    }

    Ok(Some(progress))
}

async fn load_products(pool: &PgPool, set_id: &str) -> Result<Vec<SealedProduct>> {
    let rows: Vec<(String, i64, String)> = sqlx::query_as(
        r#"
        SELECT sealedid, tcgp_id::bigint, name
        FROM pf_sealed
        WHERE setid = $1
          AND tcgp_id IS NOT NULL
        ORDER BY sealedid
        "#,
    )
    .bind(set_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(sealedid, tcgp_id, name)| SealedProduct {
            sealedid,
            tcgp_id,
            name,
        })
        .collect())
}

/// 이력 추가. 같은 (상품, 날짜) 행이 이미 있으면 건너뜁니다.
pub async fn insert_price_history(
    pool: &PgPool,
    records: &[SealedPriceRecord],
    date: NaiveDate,
) -> Result<usize> {
    let mut written = 0;

    for chunk in records.chunks(500) {
        let sealedids: Vec<&str> = chunk.iter().map(|r| r.sealedid.as_str()).collect();
        let prices: Vec<Decimal> = chunk.iter().map(|r| r.price).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pf_sealed_price_history (sealedid, price, updatedsource, updated, source)
            SELECT u.sealedid, u.price, $3::date, NOW(), $4
            FROM UNNEST($1::text[], $2::numeric[]) AS u(sealedid, price)
            WHERE NOT EXISTS (
                SELECT 1
                FROM pf_sealed_price_history h
                WHERE h.sealedid = u.sealedid
                  AND h.updatedsource = $3::date
            )
            "#,
        )
        .bind(&sealedids)
        .bind(&prices)
        .bind(date)
        .bind(PRICE_SOURCE)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}
