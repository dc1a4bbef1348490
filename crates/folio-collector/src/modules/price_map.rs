//! 카드 ↔ TCGPlayer 상품 매핑 (`pf_cards_pricing_map`).
//!
//! 카드 API의 `tcgplayer.url` 리다이렉트에서 상품 ID를 알아내고, 카드에
//! 실린 시세 키마다 (TCGPlayer 하위 타입, 내부 변형) 행을 만듭니다.
//! 이미 매핑 행이 있는 카드는 다시 조회하지 않습니다.

use folio_core::InvocationMethod;
use sqlx::PgPool;
use std::collections::HashSet;

use crate::client::{ApiCard, ProductLinkResolver};
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "initializePriceMapTable";

/// 시세 키가 없는 카드의 기본 변형
pub const DEFAULT_VARIANT: &str = "normal";

/// 매핑 수집 옵션
#[derive(Debug, Clone, Default)]
pub struct PriceMapOptions {
    /// 특정 세트만 수집
    pub set_id: Option<String>,
}

/// `pf_cards_pricing_map` 행. 상품 ID를 알 수 없으면 `tcgp_id`는 None.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceMapRow {
    pub cardid: String,
    pub tcgp_id: Option<i64>,
    pub tcgp_variant: String,
    pub pf_variant: String,
}

/// 카드 API 시세 키 → TCGPlayer 하위 타입 이름
pub fn tcgplayer_sub_type(variant: &str) -> String {
    match variant {
        "normal" => "Normal",
        "holofoil" => "Holofoil",
        "reverseHolofoil" => "Reverse Holofoil",
        "1stEdition" => "1st Edition",
        "unlimited" => "Unlimited",
        "unlimitedHolofoil" => "Unlimited Holofoil",
        "1stEditionHolofoil" => "1st Edition Holofoil",
        other => other,
    }
    .to_string()
}

/// 카드 한 장의 매핑 행. 시세 키가 없으면 기본 변형 하나만 만듭니다.
pub fn card_mappings(card: &ApiCard, tcgp_id: Option<i64>) -> Vec<PriceMapRow> {
    let mut variants: Vec<String> = card
        .tcgplayer_prices()
        .and_then(|prices| prices.as_object())
        .map(|prices| prices.keys().cloned().collect())
        .unwrap_or_default();
    if variants.is_empty() {
        variants.push(DEFAULT_VARIANT.to_string());
    }

    variants
        .into_iter()
        .map(|variant| PriceMapRow {
            cardid: card.id.clone(),
            tcgp_id,
            tcgp_variant: tcgplayer_sub_type(&variant),
            pf_variant: variant,
        })
        .collect()
}

/// 상품 매핑 수집 작업
pub async fn collect_price_map(
    ctx: &CollectorContext,
    options: PriceMapOptions,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_price_map(ctx, &options, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_price_map(
    ctx: &CollectorContext,
    options: &PriceMapOptions,
    stats: &mut CollectionStats,
) -> Result<()> {
    let resolver = ProductLinkResolver::from_config(&ctx.config.api)?;
    let sets = match &options.set_id {
        Some(set_id) => vec![set_id.clone()],
        None => super::list_set_ids(&ctx.pool).await?,
    };
    stats.total = sets.len();
    tracing::info!(sets = sets.len(), "상품 매핑 수집 시작");

    for set_id in &sets {
        match map_set_cards(ctx, &resolver, set_id, stats).await {
            Ok(0) => stats.empty += 1,
            Ok(rows) => {
                stats.success += 1;
                tracing::info!(set_id = %set_id, rows, "세트 상품 매핑 완료");
            }
            Err(e) => {
                stats.record_error();
                tracing::error!(set_id = %set_id, error = %e, "세트 상품 매핑 실패");
            }
        }
    }

    Ok(())
}

/// 한 세트의 미매핑 카드를 매핑합니다. 저장한 행 수를 반환합니다.
async fn map_set_cards(
    ctx: &CollectorContext,
    resolver: &ProductLinkResolver,
    set_id: &str,
    stats: &mut CollectionStats,
) -> Result<usize> {
    let mapped = load_mapped_cards(&ctx.pool, set_id).await?;
    let cards = super::fetch_set_cards(ctx, set_id, stats).await?;
    let pending: Vec<&ApiCard> = cards.iter().filter(|c| !mapped.contains(&c.id)).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let mut rows = Vec::new();
    for card in pending {
        let tcgp_id = resolve_card(resolver, card, stats).await;
        rows.extend(card_mappings(card, tcgp_id));
    }

    let written = insert_price_map(&ctx.pool, &rows).await?;
    stats.rows_written += written;
    Ok(written)
}

/// 카드의 상품 ID. 링크가 없거나 해석에 실패하면 None.
async fn resolve_card(
    resolver: &ProductLinkResolver,
    card: &ApiCard,
    stats: &mut CollectionStats,
) -> Option<i64> {
    let Some(url) = card.tcgplayer_url() else {
        stats.skipped += 1;
        tracing::debug!(cardid = %card.id, "TCGPlayer 링크 없음");
        return None;
    };

    match resolver.resolve(url).await {
        Ok(Some(id)) => Some(id),
        Ok(None) => {
            stats.skipped += 1;
            tracing::warn!(cardid = %card.id, url, "상품 ID 없는 리다이렉트");
            None
        }
        Err(e) => {
            stats.skipped += 1;
            tracing::warn!(cardid = %card.id, url, error = %e, "상품 링크 해석 실패");
            None
        }
    }
}

async fn load_mapped_cards(pool: &PgPool, set_id: &str) -> Result<HashSet<String>> {
    let cards: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT m.cardid
        FROM pf_cards_pricing_map m
        JOIN pfdata_cards c ON c.cardid = m.cardid
        WHERE c.setid = $1
        "#,
    )
    .bind(set_id)
    .fetch_all(pool)
    .await?;
    Ok(cards.into_iter().collect())
}

/// 매핑 행 추가. 충돌하는 행은 건너뜁니다.
pub async fn insert_price_map(pool: &PgPool, rows: &[PriceMapRow]) -> Result<usize> {
    let mut written = 0;

    for chunk in rows.chunks(500) {
        let cardids: Vec<&str> = chunk.iter().map(|r| r.cardid.as_str()).collect();
        let tcgp_ids: Vec<Option<i64>> = chunk.iter().map(|r| r.tcgp_id).collect();
        let tcgp_variants: Vec<&str> = chunk.iter().map(|r| r.tcgp_variant.as_str()).collect();
        let pf_variants: Vec<&str> = chunk.iter().map(|r| r.pf_variant.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pf_cards_pricing_map (cardid, tcgp_id, tcgp_variant, pf_variant)
            SELECT * FROM UNNEST($1::text[], $2::bigint[], $3::text[], $4::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&cardids)
        .bind(&tcgp_ids)
        .bind(&tcgp_variants)
        .bind(&pf_variants)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}
