//! sqlx 기반 분석 저장소.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use folio_core::{
    Horizon, ItemKey, PriceChangeRow, PriceObservation, TrackingRecord, TrackingStatus,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::kind::AnalysisKind;
use super::store::{AnalysisStore, TrackingCounts};
use crate::Result;

/// staging 일괄 삽입 단위
const INSERT_CHUNK_SIZE: usize = 500;

/// 분석 종류 하나에 대한 Postgres 저장소
#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
    kind: AnalysisKind,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool, kind: AnalysisKind) -> Self {
        Self { pool, kind }
    }

    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    async fn set_status(&self, partition: &str, status: TrackingStatus) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = $2, processed_at = NOW() WHERE setid = $1",
            self.kind.tracking_table()
        );
        sqlx::query(&sql)
            .bind(partition)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_chunk(&self, sql: &str, rows: &[PriceChangeRow]) -> Result<u64> {
        let item_ids: Vec<String> = rows.iter().map(|r| r.key.item_id.clone()).collect();
        let variants: Vec<Option<String>> = rows.iter().map(|r| r.key.variant.clone()).collect();
        let grades: Vec<Option<String>> = rows.iter().map(|r| r.key.grade.clone()).collect();
        let current: Vec<Decimal> = rows.iter().map(|r| r.current_price).collect();
        let previous: Vec<Option<Decimal>> =
            rows.iter().map(|r| r.previous.previous_price).collect();
        let percentage: Vec<Option<Decimal>> =
            rows.iter().map(|r| r.previous.percentage_change).collect();
        let latest: Vec<NaiveDate> = rows.iter().map(|r| r.latest_update_date).collect();
        let previous_dates: Vec<Option<NaiveDate>> =
            rows.iter().map(|r| r.previous_update_date()).collect();

        let mut query = sqlx::query(sql).bind(item_ids);
        if self.kind.has_variant() {
            query = query.bind(variants);
        }
        if self.kind.has_grade() {
            query = query.bind(grades);
        }
        query = query
            .bind(current)
            .bind(previous)
            .bind(percentage)
            .bind(latest)
            .bind(previous_dates);

        for horizon in Horizon::ALL {
            let changes = rows.iter().map(|r| r.horizon(horizon));
            let prices: Vec<Option<Decimal>> = changes.clone().map(|c| c.previous_price).collect();
            let deltas: Vec<Option<Decimal>> = changes.clone().map(|c| c.price_change).collect();
            let pcts: Vec<Option<Decimal>> = changes.map(|c| c.percentage_change).collect();
            query = query.bind(prices).bind(deltas).bind(pcts);
        }

        let sources: Vec<String> = rows
            .iter()
            .map(|r| r.previous.source.as_str().to_string())
            .collect();
        query = query.bind(sources);
        for horizon in Horizon::ALL {
            let sources: Vec<String> = rows
                .iter()
                .map(|r| r.horizon(horizon).source.as_str().to_string())
                .collect();
            query = query.bind(sources);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn prepare_staging(&self) -> Result<()> {
        let staging = self.kind.staging_table();
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", staging))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "CREATE TABLE {} (LIKE {} INCLUDING DEFAULTS)",
            staging,
            self.kind.production_table()
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn seed_tracking(&self) -> Result<u64> {
        let sql = format!(
            r#"
            INSERT INTO {} (setid, status, record_count)
            SELECT s.setid, 'PENDING', 0
            FROM pfdata_sets s
            ON CONFLICT (setid) DO NOTHING
            "#,
            self.kind.tracking_table()
        );
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn reset_tracking(&self) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'PENDING', processed_at = NULL, record_count = 0, error_message = NULL
            "#,
            self.kind.tracking_table()
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn pending_partitions(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT setid FROM {} WHERE status = 'PENDING' ORDER BY setid",
            self.kind.tracking_table()
        );
        let partitions: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(partitions)
    }

    async fn mark_in_progress(&self, partition: &str) -> Result<()> {
        self.set_status(partition, TrackingStatus::InProgress).await
    }

    async fn load_observations(&self, partition: &str) -> Result<Vec<PriceObservation>> {
        let rows: Vec<(String, Option<String>, Option<String>, Decimal, NaiveDate)> =
            sqlx::query_as(self.kind.observation_query())
                .bind(partition)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(item_id, variant, grade, price, observed_on)| {
                let key = ItemKey {
                    item_id,
                    variant,
                    grade,
                };
                PriceObservation::new(key, price, observed_on)
            })
            .collect())
    }

    async fn append_staging(&self, rows: &[PriceChangeRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = self.kind.staging_insert_sql();
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            inserted += self.insert_chunk(&sql, chunk).await?;
        }
        Ok(inserted)
    }

    async fn mark_completed(&self, partition: &str, record_count: u64) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'COMPLETED', processed_at = NOW(), record_count = $2, error_message = NULL
            WHERE setid = $1
            "#,
            self.kind.tracking_table()
        );
        sqlx::query(&sql)
            .bind(partition)
            .bind(record_count as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, partition: &str, error: &str) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'FAILED', processed_at = NOW(), error_message = $2
            WHERE setid = $1
            "#,
            self.kind.tracking_table()
        );
        sqlx::query(&sql)
            .bind(partition)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn tracking_counts(&self) -> Result<TrackingCounts> {
        let sql = format!(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'COMPLETED')
            FROM {}
            "#,
            self.kind.tracking_table()
        );
        let (total, completed): (i64, i64) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(TrackingCounts { total, completed })
    }

    async fn failed_partitions(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT setid FROM {} WHERE status = 'FAILED' ORDER BY setid",
            self.kind.tracking_table()
        );
        let partitions: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(partitions)
    }

    async fn promote_staging(&self) -> Result<u64> {
        let production = self.kind.production_table();
        let staging = self.kind.staging_table();

        // 커밋 전 에러는 tx drop 시 롤백
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("TRUNCATE TABLE {}", production))
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} SELECT * FROM {}",
            production, staging
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    async fn cleanup(&self) -> Result<()> {
        sqlx::query(&format!("TRUNCATE TABLE {}", self.kind.staging_table()))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "UPDATE {} SET status = 'COMPLETED', processed_at = NOW()",
            self.kind.tracking_table()
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn tracking_records(&self) -> Result<Vec<TrackingRecord>> {
        let sql = format!(
            r#"
            SELECT setid, status, processed_at, COALESCE(record_count, 0)::bigint, error_message
            FROM {}
            ORDER BY setid
            "#,
            self.kind.tracking_table()
        );
        let rows: Vec<(String, String, Option<DateTime<Utc>>, i64, Option<String>)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for (partition_key, status, processed_at, record_count, error_message) in rows {
            records.push(TrackingRecord {
                partition_key,
                status: status.parse()?,
                processed_at,
                record_count,
                error_message,
            });
        }
        Ok(records)
    }
}
