//! 가격 수집 진행 로그 (`pf_logs_price_update`, `pf_logs_sealed_price_update`).
//!
//! 세트를 하나 처리할 때마다 진행률과 세트별 상세(처리/저장/실패 수,
//! 문제 항목 목록)를 JSON으로 갱신합니다.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::client::{TcgPlayerClient, TcgPrice};
use crate::{CollectionStats, Result};

/// 가격 로그 테이블 구성
#[derive(Debug, Clone, Copy)]
pub struct PriceLogTable {
    pub table: &'static str,
    /// 세트별 문제 항목 수 컬럼
    pub flagged_column: &'static str,
}

pub const CARD_PRICE_LOG: PriceLogTable = PriceLogTable {
    table: "pf_logs_price_update",
    flagged_column: "flagged_cards",
};

pub const SEALED_PRICE_LOG: PriceLogTable = PriceLogTable {
    table: "pf_logs_sealed_price_update",
    flagged_column: "flagged_products",
};

/// 문제 항목 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedItems {
    /// 매핑되지 않은 상품
    pub skipped: Vec<String>,
    /// 시장가 없음
    pub null_price: Vec<String>,
    /// 저장 실패
    pub failed: Vec<String>,
}

impl FlaggedItems {
    pub fn count(&self) -> usize {
        self.skipped.len() + self.null_price.len() + self.failed.len()
    }
}

/// 세트 하나의 가격 수집 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPriceProgress {
    /// 응답에 포함된 시세 수
    pub processed: usize,
    /// 저장 시도 행 수
    pub inserted: usize,
    /// 실패한 조회/저장 수
    pub failed: usize,
    /// 세트 전체 시세 합계 (카드만)
    pub set_price: Option<Decimal>,
    /// 매핑 행 수
    pub total_records: usize,
    pub flagged: FlaggedItems,
}

/// 진행 중인 가격 로그
#[derive(Debug)]
pub struct PriceUpdateLog {
    table: PriceLogTable,
    id: i64,
    total_sets: usize,
    details: BTreeMap<String, SetPriceProgress>,
    flagged: BTreeMap<String, usize>,
}

impl PriceUpdateLog {
    /// 로그 행 생성
    pub async fn start(pool: &PgPool, table: PriceLogTable, total_sets: usize) -> Result<Self> {
        let sql = format!(
            r#"
            INSERT INTO {} (progress, time_started, progress_details, {})
            VALUES (0, NOW(), '{{}}', '{{}}')
            RETURNING id::bigint
            "#,
            table.table, table.flagged_column
        );
        let id: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;

        Ok(Self {
            table,
            id,
            total_sets,
            details: BTreeMap::new(),
            flagged: BTreeMap::new(),
        })
    }

    /// `processed_sets`개 처리 후 진행률 (%, 소수 첫째 자리)
    pub fn progress(&self, processed_sets: usize) -> Decimal {
        if self.total_sets == 0 {
            return Decimal::ONE_HUNDRED;
        }
        (Decimal::from(processed_sets) * Decimal::ONE_HUNDRED / Decimal::from(self.total_sets))
            .round_dp(1)
    }

    /// 세트 결과 기록. 갱신 실패는 수집을 멈추지 않습니다.
    pub async fn record(
        &mut self,
        pool: &PgPool,
        set_id: &str,
        processed_sets: usize,
        progress: SetPriceProgress,
    ) {
        self.flagged
            .insert(set_id.to_string(), progress.flagged.count());
        self.details.insert(set_id.to_string(), progress);

        let sql = format!(
            "UPDATE {} SET progress = $1, progress_details = $2, {} = $3 WHERE id = $4",
            self.table.table, self.table.flagged_column
        );
        let details = sqlx::types::Json(&self.details);
        let flagged = sqlx::types::Json(&self.flagged);

        if let Err(e) = sqlx::query(&sql)
            .bind(self.progress(processed_sets))
            .bind(details)
            .bind(flagged)
            .bind(self.id)
            .execute(pool)
            .await
        {
            tracing::warn!(log_id = self.id, error = %e, "가격 진행 로그 갱신 실패");
        }
    }

    /// 종료 시각 기록
    pub async fn finish(self, pool: &PgPool) {
        let sql = format!(
            "UPDATE {} SET time_ended = NOW(), progress = 100 WHERE id = $1",
            self.table.table
        );
        if let Err(e) = sqlx::query(&sql).bind(self.id).execute(pool).await {
            tracing::warn!(log_id = self.id, error = %e, "가격 진행 로그 종료 기록 실패");
        }
    }
}

/// 상품 ID를 묶음 단위로 조회합니다. 실패한 묶음은 건너뜁니다.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_price_chunks(
    client: &TcgPlayerClient,
    token: &str,
    product_ids: &[i64],
    chunk_size: usize,
    delay: std::time::Duration,
    set_id: &str,
    stats: &mut CollectionStats,
    progress: &mut SetPriceProgress,
) -> Vec<TcgPrice> {
    let mut prices = Vec::new();

    for (index, chunk) in product_ids.chunks(chunk_size).enumerate() {
        if index > 0 {
            tokio::time::sleep(delay).await;
        }
        match client.fetch_prices(token, chunk).await {
            Ok(results) => {
                progress.processed += results.len();
                prices.extend(results);
            }
            Err(e) => {
                stats.record_error();
                progress.failed += 1;
                tracing::warn!(set_id, products = chunk.len(), error = %e, "가격 조회 실패");
            }
        }
    }

    prices
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn log(total_sets: usize) -> PriceUpdateLog {
        PriceUpdateLog {
            table: CARD_PRICE_LOG,
            id: 1,
            total_sets,
            details: BTreeMap::new(),
            flagged: BTreeMap::new(),
        }
    }

    #[test]
    fn test_progress_rounding() {
        assert_eq!(log(3).progress(1), dec!(33.3));
        assert_eq!(log(3).progress(3), dec!(100));
        assert_eq!(log(0).progress(0), dec!(100));
    }

    #[test]
    fn test_progress_details_json_shape() {
        let progress = SetPriceProgress {
            processed: 3,
            inserted: 2,
            failed: 0,
            set_price: Some(dec!(12.5)),
            total_records: 4,
            flagged: FlaggedItems {
                skipped: vec!["No product found - ID: 9".to_string()],
                null_price: vec![],
                failed: vec![],
            },
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["totalRecords"], 4);
        assert_eq!(json["flagged"]["nullPrice"], serde_json::json!([]));
        assert_eq!(progress.flagged.count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_price_chunks_skips_failed_chunk() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/pricing/product/1,2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"productId":1,"marketPrice":1.0,"subTypeName":"Normal"}]}"#)
            .create_async()
            .await;
        let _fail = server
            .mock("GET", "/pricing/product/3")
            .with_status(500)
            .create_async()
            .await;

        let http = crate::client::build_http_client(std::time::Duration::from_secs(5)).unwrap();
        let client = TcgPlayerClient::new(http, server.url(), None, None);
        let mut stats = CollectionStats::new();
        let mut progress = SetPriceProgress::default();

        let prices = fetch_price_chunks(
            &client,
            "tok",
            &[1, 2, 3],
            2,
            std::time::Duration::ZERO,
            "sv1",
            &mut stats,
            &mut progress,
        )
        .await;

        assert_eq!(prices.len(), 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.failed, 1);
    }
}
