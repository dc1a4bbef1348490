//! 카드 시세 수집 (TCGPlayer → `pf_cards_price_history`).
//!
//! 세트마다 `pf_cards_pricing_map`의 TCGPlayer 상품 매핑을 읽어 시세를
//! 조회하고, (카드, 변형, 날짜) 행이 없을 때만 이력에 추가합니다.
//! 이어서 세트 시세 합계를 `pfdata_setprices`에 기록합니다.

use chrono::{NaiveDate, Utc};
use folio_core::InvocationMethod;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::price_log::{fetch_price_chunks, PriceUpdateLog, SetPriceProgress, CARD_PRICE_LOG};
use crate::client::tcgplayer::PRODUCT_CHUNK_SIZE;
use crate::client::TcgPrice;
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectCardPrices";

/// 이력 행의 출처
pub const PRICE_SOURCE: &str = "tcgplayer";

/// TCGPlayer 상품 ↔ 카드 변형 매핑
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingMapping {
    pub cardid: String,
    pub tcgp_id: i64,
    /// TCGPlayer 하위 타입 이름 (Normal, Holofoil 등)
    pub tcgp_variant: String,
    /// 내부 변형 이름 (normal, holofoil 등)
    pub pf_variant: String,
}

/// 이력에 추가할 시세
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPriceRecord {
    pub cardid: String,
    pub variant: String,
    pub price: Decimal,
}

/// 상품 ID별 매핑. 같은 상품 안에서 TCGPlayer 하위 타입은 첫 매핑만 유지합니다.
pub fn product_map(mappings: &[PricingMapping]) -> BTreeMap<i64, Vec<PricingMapping>> {
    let mut map: BTreeMap<i64, Vec<PricingMapping>> = BTreeMap::new();
    for mapping in mappings {
        let entry = map.entry(mapping.tcgp_id).or_default();
        if !entry.iter().any(|m| m.tcgp_variant == mapping.tcgp_variant) {
            entry.push(mapping.clone());
        }
    }
    map
}

/// 시세 응답을 카드 변형에 대응시킵니다. (카드, 변형)당 첫 시세만 사용합니다.
pub fn match_card_prices(
    products: &BTreeMap<i64, Vec<PricingMapping>>,
    prices: &[TcgPrice],
    progress: &mut SetPriceProgress,
) -> Vec<CardPriceRecord> {
    let mut records: BTreeMap<(String, String), CardPriceRecord> = BTreeMap::new();

    for price in prices {
        let Some(candidates) = products.get(&price.product_id) else {
            progress
                .flagged
                .skipped
                .push(format!("No product found - ID: {}", price.product_id));
            continue;
        };
        let Some(card) = candidates
            .iter()
            .find(|m| m.tcgp_variant == price.sub_type_name)
        else {
            continue;
        };
        let Some(market) = price.market_price else {
            progress.flagged.null_price.push(format!(
                "Null price - Card: {}, Variant: {}",
                card.cardid, card.pf_variant
            ));
            continue;
        };

        records
            .entry((card.cardid.clone(), card.pf_variant.clone()))
            .or_insert_with(|| CardPriceRecord {
                cardid: card.cardid.clone(),
                variant: card.pf_variant.clone(),
                price: market,
            });
    }

    records.into_values().collect()
}

/// 카드 시세 수집 작업
pub async fn collect_card_prices(
    ctx: &CollectorContext,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_card_prices(ctx, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_card_prices(ctx: &CollectorContext, stats: &mut CollectionStats) -> Result<()> {
    let sets = super::list_set_ids(&ctx.pool).await?;
    let token = ctx.tcgplayer.access_token().await?;
    let mut log = PriceUpdateLog::start(&ctx.pool, CARD_PRICE_LOG, sets.len()).await?;
    let today = Utc::now().date_naive();

    stats.total = sets.len();
    tracing::info!(sets = sets.len(), date = %today, "카드 시세 수집 시작");

    for (index, set_id) in sets.iter().enumerate() {
        match collect_set_prices(ctx, &token, set_id, today, stats).await {
            Ok(Some(progress)) => {
                stats.success += 1;
                tracing::debug!(
                    set_id = %set_id,
                    processed = progress.processed,
                    inserted = progress.inserted,
                    "세트 시세 수집 완료"
                );
                log.record(&ctx.pool, set_id, index + 1, progress).await;
            }
            Ok(None) => stats.empty += 1,
            Err(e) => {
                stats.record_error();
                tracing::error!(set_id = %set_id, error = %e, "세트 시세 수집 실패");
            }
        }
    }

    log.finish(&ctx.pool).await;
    Ok(())
}

/// 한 세트의 시세 수집. 매핑이 없으면 None.
async fn collect_set_prices(
    ctx: &CollectorContext,
    token: &str,
    set_id: &str,
    today: NaiveDate,
    stats: &mut CollectionStats,
) -> Result<Option<SetPriceProgress>> {
    let mappings = load_mappings(&ctx.pool, set_id).await?;
    if mappings.is_empty() {
        return Ok(None);
    }

    let mut progress = SetPriceProgress {
        total_records: mappings.len(),
        ..Default::default()
    };
    let products = product_map(&mappings);
    let product_ids: Vec<i64> = products.keys().copied().collect();

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

    let records = match_card_prices(&products, &prices, &mut progress);
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
            tracing::warn!(set_id, error = %e, "시세 이력 저장 실패");
        }
    }

    match record_set_total(&ctx.pool, set_id, today).await {
        Ok(total) => progress.set_price = total,
        Err(e) => {
            stats.record_error();
            tracing::warn!(set_id, error = %e, "세트 시세 합계 기록 실패");
        }
    }

    Ok(Some(progress))
}

async fn load_mappings(pool: &PgPool, set_id: &str) -> Result<Vec<PricingMapping>> {
    let rows: Vec<(String, i64, String, String)> = sqlx::query_as(
        r#"
        SELECT DISTINCT m.cardid, m.tcgp_id::bigint, m.tcgp_variant, m.pf_variant
        FROM pf_cards_pricing_map m
        JOIN pfdata_cards c ON c.cardid = m.cardid
        WHERE c.setid = $1
          AND m.tcgp_id IS NOT NULL
        ORDER BY m.cardid, m.pf_variant
        "#,
    )
    .bind(set_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(cardid, tcgp_id, tcgp_variant, pf_variant)| PricingMapping {
            cardid,
            tcgp_id,
            tcgp_variant,
            pf_variant,
        })
        .collect())
}

/// 이력 추가. 같은 (카드, 변형, 날짜) 행이 이미 있으면 건너뜁니다.
pub async fn insert_price_history(
    pool: &PgPool,
    records: &[CardPriceRecord],
    date: NaiveDate,
) -> Result<usize> {
    let mut written = 0;

    for chunk in records.chunks(500) {
        let cardids: Vec<&str> = chunk.iter().map(|r| r.cardid.as_str()).collect();
        let variants: Vec<&str> = chunk.iter().map(|r| r.variant.as_str()).collect();
        let prices: Vec<Decimal> = chunk.iter().map(|r| r.price).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pf_cards_price_history (cardid, variant, price, updatedsource, updated, source)
            SELECT u.cardid, u.variant, u.price, $4::date, NOW(), $5
            FROM UNNEST($1::text[], $2::text[], $3::numeric[]) AS u(cardid, variant, price)
            WHERE NOT EXISTS (
                SELECT 1
                FROM pf_cards_price_history h
                WHERE h.cardid = u.cardid
                  AND h.variant = u.variant
                  AND h.updatedsource = $4::date
            )
            "#,
        )
        .bind(&cardids)
        .bind(&variants)
        .bind(&prices)
        .bind(date)
        .bind(PRICE_SOURCE)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}

/// 가장 최근 수집일 기준 세트 시세 합계를 기록합니다.
async fn record_set_total(pool: &PgPool, set_id: &str, date: NaiveDate) -> Result<Option<Decimal>> {
    let total: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT SUM(h.price)
        FROM pf_cards_price_history h
        JOIN pfdata_cards c ON c.cardid = h.cardid
        WHERE c.setid = $1
          AND h.updated::date = (
              SELECT MAX(h2.updated::date)
              FROM pf_cards_price_history h2
              JOIN pfdata_cards c2 ON c2.cardid = h2.cardid
              WHERE c2.setid = $1
          )
        "#,
    )
    .bind(set_id)
    .fetch_one(pool)
    .await?;

    let Some(total) = total else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO pfdata_setprices (setid, price, updatedsource, source, updated)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (setid, source, updatedsource) DO NOTHING
        "#,
    )
    .bind(set_id)
    .bind(total)
    .bind(date)
    .bind(PRICE_SOURCE)
    .execute(pool)
    .await?;

    Ok(Some(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mapping(cardid: &str, tcgp_id: i64, tcgp_variant: &str, pf_variant: &str) -> PricingMapping {
        PricingMapping {
            cardid: cardid.to_string(),
            tcgp_id,
            tcgp_variant: tcgp_variant.to_string(),
            pf_variant: pf_variant.to_string(),
        }
    }

    fn price(product_id: i64, market: Option<Decimal>, sub_type: &str) -> TcgPrice {
        TcgPrice {
            product_id,
            market_price: market,
            sub_type_name: sub_type.to_string(),
        }
    }

    #[test]
    fn test_product_map_keeps_first_variant_mapping() {
        let mappings = vec![
            mapping("sv1-1", 100, "Normal", "normal"),
            mapping("sv1-1", 100, "Reverse Holofoil", "reverseHolofoil"),
            mapping("sv1-1b", 100, "Normal", "normal"),
        ];
        let map = product_map(&mappings);
        assert_eq!(map[&100].len(), 2);
        assert_eq!(map[&100][0].cardid, "sv1-1");
    }

    #[test]
    fn test_match_card_prices_flags_problems() {
        let products = product_map(&[
            mapping("sv1-1", 100, "Normal", "normal"),
            mapping("sv1-1", 100, "Reverse Holofoil", "reverseHolofoil"),
            mapping("sv1-2", 200, "Holofoil", "holofoil"),
        ]);
        let prices = vec![
            price(100, Some(dec!(0.25)), "Normal"),
            price(100, None, "Reverse Holofoil"),
            price(200, Some(dec!(3.10)), "Holofoil"),
            // 같은 카드 변형의 중복 시세는 무시
            price(200, Some(dec!(9.99)), "Holofoil"),
            // 매핑되지 않은 하위 타입
            price(200, Some(dec!(1.00)), "1st Edition"),
            price(999, Some(dec!(5.00)), "Normal"),
        ];
        let mut progress = SetPriceProgress::default();

        let records = match_card_prices(&products, &prices, &mut progress);

        assert_eq!(
            records,
            vec![
                CardPriceRecord {
                    cardid: "sv1-1".to_string(),
                    variant: "normal".to_string(),
                    price: dec!(0.25),
                },
                CardPriceRecord {
                    cardid: "sv1-2".to_string(),
                    variant: "holofoil".to_string(),
                    price: dec!(3.10),
                },
            ]
        );
        assert_eq!(progress.flagged.skipped, vec!["No product found - ID: 999"]);
        assert_eq!(progress.flagged.null_price.len(), 1);
    }
}
