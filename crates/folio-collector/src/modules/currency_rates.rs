//! USD 기준 환율 수집 (`usd_pairs`).

use chrono::{DateTime, Utc};
use folio_core::InvocationMethod;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::client::CurrencyRates;
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectCurrencyRates";

/// `usd_pairs` 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsdPair {
    pub currency: String,
    pub rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// 응답을 저장용 행으로 변환. 기준 시각이 없으면 `now`를 사용합니다.
pub fn usd_pairs(rates: &CurrencyRates, now: DateTime<Utc>) -> Vec<UsdPair> {
    let timestamp = rates.quoted_at().unwrap_or(now);
    rates
        .iso_rates()
        .map(|(currency, rate)| UsdPair {
            currency: currency.to_string(),
            rate,
            timestamp,
        })
        .collect()
}

/// 환율 수집 작업
pub async fn collect_currency_rates(
    ctx: &CollectorContext,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_currency_rates(ctx, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_currency_rates(ctx: &CollectorContext, stats: &mut CollectionStats) -> Result<()> {
    let rates = ctx.currency.latest().await?;
    let pairs = usd_pairs(&rates, Utc::now());
    stats.total = pairs.len();

    if pairs.is_empty() {
        stats.empty += 1;
        tracing::warn!("환율 응답에 통화가 없습니다");
        return Ok(());
    }

    let written = upsert_usd_pairs(&ctx.pool, &pairs).await?;
    stats.success = pairs.len();
    stats.rows_written += written;
    tracing::info!(currencies = pairs.len(), "환율 갱신 완료");
    Ok(())
}

/// 통화별 최신 환율로 갱신
pub async fn upsert_usd_pairs(pool: &PgPool, pairs: &[UsdPair]) -> Result<usize> {
    let currencies: Vec<&str> = pairs.iter().map(|p| p.currency.as_str()).collect();
    let rates: Vec<Decimal> = pairs.iter().map(|p| p.rate).collect();
    let timestamps: Vec<DateTime<Utc>> = pairs.iter().map(|p| p.timestamp).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO usd_pairs (currency, rate, timestamp)
        SELECT * FROM UNNEST($1::text[], $2::numeric[], $3::timestamptz[])
        ON CONFLICT (currency) DO UPDATE SET
            rate = EXCLUDED.rate,
            timestamp = EXCLUDED.timestamp
        "#,
    )
    .bind(&currencies)
    .bind(&rates)
    .bind(&timestamps)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn rates(date: Option<&str>, timestamp: Option<i64>) -> CurrencyRates {
        let mut rates = BTreeMap::new();
        rates.insert("EUR".to_string(), dec!(0.92));
        rates.insert("KRW".to_string(), dec!(1375.5));
        rates.insert("BITCOIN".to_string(), dec!(0.00001));
        CurrencyRates {
            success: true,
            timestamp,
            date: date.map(str::to_string),
            base: "USD".to_string(),
            rates,
        }
    }

    #[test]
    fn test_usd_pairs_filters_codes_and_uses_quote_time() {
        let now = Utc::now();
        let pairs = usd_pairs(&rates(Some("2024-06-15T10:00:00Z"), None), now);

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].currency, "EUR");
        assert_eq!(pairs[1].rate, dec!(1375.5));
        let quoted = DateTime::parse_from_rfc3339("2024-06-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(pairs.iter().all(|p| p.timestamp == quoted));
    }

    #[test]
    fn test_usd_pairs_without_quote_time_uses_now() {
        let now = Utc::now();
        let pairs = usd_pairs(&rates(None, None), now);
        assert!(pairs.iter().all(|p| p.timestamp == now));
    }
}
