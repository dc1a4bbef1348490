//! 세트 메타데이터 및 이미지 수집.

use chrono::{NaiveDate, NaiveDateTime};
use folio_core::InvocationMethod;
use serde_json::Value;
use sqlx::PgPool;

use crate::client::{parse_api_date, parse_api_datetime, ApiSet};
use crate::config::StorageConfig;
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::storage::{set_logo_key, set_symbol_key, ImageUpload};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectSets";

/// 세트 수집 옵션
#[derive(Debug, Clone, Copy, Default)]
pub struct SetCollectOptions {
    /// `pfdata_sets` 갱신
    pub meta: bool,
    /// 심볼/로고 이미지 업로드
    pub images: bool,
}

/// `pfdata_sets` 한 행
#[derive(Debug, Clone, PartialEq)]
pub struct SetRow {
    pub setid: String,
    pub name: String,
    pub series: Option<String>,
    pub printed_total: Option<i32>,
    pub total: Option<i32>,
    pub legalities: Value,
    pub ptcgo_code: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub updated_at: Option<NaiveDateTime>,
    pub img_symbol: String,
    pub img_logo: String,
}

impl SetRow {
    /// API 세트를 저장용 행으로 변환. 이미지 URL은 CDN 주소로 바꿉니다.
    pub fn from_api(set: &ApiSet, storage: &StorageConfig) -> Self {
        Self {
            setid: set.id.clone(),
            name: set.name.clone(),
            series: set.series.clone(),
            printed_total: set.printed_total,
            total: set.total,
            legalities: set.legalities.clone(),
            ptcgo_code: set.ptcgo_code.clone(),
            release_date: set.release_date.as_deref().and_then(parse_api_date),
            updated_at: set.updated_at.as_deref().and_then(parse_api_datetime),
            img_symbol: storage.public_url(&set_symbol_key(&set.id)),
            img_logo: storage.public_url(&set_logo_key(&set.id)),
        }
    }
}

/// 세트의 업로드 대상 이미지
pub fn set_images(set: &ApiSet) -> Vec<ImageUpload> {
    let mut uploads = Vec::with_capacity(2);
    if let Some(symbol) = &set.images.symbol {
        uploads.push(ImageUpload::new(symbol, set_symbol_key(&set.id)));
    }
    if let Some(logo) = &set.images.logo {
        uploads.push(ImageUpload::new(logo, set_logo_key(&set.id)));
    }
    uploads
}

/// 세트 수집 작업
pub async fn collect_sets(
    ctx: &CollectorContext,
    options: SetCollectOptions,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_sets(ctx, options, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_sets(
    ctx: &CollectorContext,
    options: SetCollectOptions,
    stats: &mut CollectionStats,
) -> Result<()> {
    let store = if options.images {
        Some(ctx.require_image_store()?)
    } else {
        None
    };

    let sets = ctx.card_api.fetch_sets().await?;
    stats.total = sets.len();
    if sets.is_empty() {
        stats.empty += 1;
        return Ok(());
    }

    if options.meta {
        let rows: Vec<SetRow> = sets
            .iter()
            .map(|s| SetRow::from_api(s, &ctx.config.storage))
            .collect();
        let written = upsert_sets(&ctx.pool, &rows).await?;
        stats.rows_written += written;
        tracing::info!(sets = rows.len(), written, "세트 메타데이터 저장 완료");
    }

    if let Some(store) = store {
        let uploads: Vec<ImageUpload> = sets.iter().flat_map(set_images).collect();
        tracing::info!(count = uploads.len(), "세트 이미지 업로드 시작");
        super::upload_images(&ctx.http, store, &uploads, stats).await;
    }

    stats.success = sets.len();
    Ok(())
}

/// `pfdata_sets` upsert (충돌 시 갱신)
pub async fn upsert_sets(pool: &PgPool, rows: &[SetRow]) -> Result<usize> {
    let mut written = 0;

    for chunk in rows.chunks(500) {
        let setids: Vec<&str> = chunk.iter().map(|r| r.setid.as_str()).collect();
        let names: Vec<&str> = chunk.iter().map(|r| r.name.as_str()).collect();
        let series: Vec<Option<&str>> = chunk.iter().map(|r| r.series.as_deref()).collect();
        let printed: Vec<Option<i32>> = chunk.iter().map(|r| r.printed_total).collect();
        let totals: Vec<Option<i32>> = chunk.iter().map(|r| r.total).collect();
        let legalities: Vec<Value> = chunk.iter().map(|r| r.legalities.clone()).collect();
        let codes: Vec<Option<&str>> = chunk.iter().map(|r| r.ptcgo_code.as_deref()).collect();
        let released: Vec<Option<NaiveDate>> = chunk.iter().map(|r| r.release_date).collect();
        let updated: Vec<Option<NaiveDateTime>> = chunk.iter().map(|r| r.updated_at).collect();
        let symbols: Vec<&str> = chunk.iter().map(|r| r.img_symbol.as_str()).collect();
        let logos: Vec<&str> = chunk.iter().map(|r| r.img_logo.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pfdata_sets
                (setid, name, series, printedtotal, total, legalities, ptcgocode,
                 releaseddate, updatedat, imgsymbol, imglogo)
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::int4[], $5::int4[], $6::jsonb[],
                $7::text[], $8::date[], $9::timestamp[], $10::text[], $11::text[]
            )
            ON CONFLICT (setid) DO UPDATE SET
                name = EXCLUDED.name,
                series = EXCLUDED.series,
                printedtotal = EXCLUDED.printedtotal,
                total = EXCLUDED.total,
                legalities = EXCLUDED.legalities,
                ptcgocode = EXCLUDED.ptcgocode,
                releaseddate = EXCLUDED.releaseddate,
                updatedat = EXCLUDED.updatedat,
                imgsymbol = EXCLUDED.imgsymbol,
                imglogo = EXCLUDED.imglogo
            "#,
        )
        .bind(&setids)
        .bind(&names)
        .bind(&series)
        .bind(&printed)
        .bind(&totals)
        .bind(&legalities)
        .bind(&codes)
        .bind(&released)
        .bind(&updated)
        .bind(&symbols)
        .bind(&logos)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}
