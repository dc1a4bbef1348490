//! 사용자별 포트폴리오 가치 스냅샷 (`pf_portfoliosnapshots`).
//!
//! 보유 중인 카드마다 가장 최근 `pfdata_cardprices` 스냅샷에서
//! 해당 변형의 시장가를 읽어 합산합니다. 가격이 없으면 0으로 봅니다.

use chrono::{NaiveDate, Utc};
use folio_core::InvocationMethod;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectAllPortfolioValues";

/// 보유 카드 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub userid: String,
    pub variant: Option<String>,
    /// 최신 가격 스냅샷 (없으면 None)
    pub prices: Option<Value>,
}

/// `pf_portfoliosnapshots` 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioSnapshot {
    pub userid: String,
    pub value: Decimal,
    pub date: NaiveDate,
}

/// `prices[variant].market` 값. 읽을 수 없으면 None.
pub fn market_price(prices: &Value, variant: &str) -> Option<Decimal> {
    match prices.get(variant)?.get("market")? {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// 사용자별 합계. 보유 카드가 없는 사용자도 0으로 포함됩니다.
pub fn portfolio_totals(
    users: &[String],
    holdings: &[Holding],
    date: NaiveDate,
) -> Vec<PortfolioSnapshot> {
    let mut totals: BTreeMap<&str, Decimal> =
        users.iter().map(|u| (u.as_str(), Decimal::ZERO)).collect();

    for holding in holdings {
        let price = match (&holding.prices, &holding.variant) {
            (Some(prices), Some(variant)) => market_price(prices, variant).unwrap_or_default(),
            _ => Decimal::ZERO,
        };
        *totals.entry(holding.userid.as_str()).or_default() += price;
    }

    totals
        .into_iter()
        .map(|(userid, value)| PortfolioSnapshot {
            userid: userid.to_string(),
            value,
            date,
        })
        .collect()
}

/// 포트폴리오 가치 수집 작업
pub async fn collect_portfolio_values(
    ctx: &CollectorContext,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_portfolio_values(&ctx.pool, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_portfolio_values(pool: &PgPool, stats: &mut CollectionStats) -> Result<()> {
    let users: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT DISTINCT userid
        FROM pf_inventory
        ORDER BY userid
        "#,
    )
    .fetch_all(pool)
    .await?;

    stats.total = users.len();
    if users.is_empty() {
        stats.empty += 1;
        return Ok(());
    }

    let holdings = load_holdings(pool).await?;
    let snapshots = portfolio_totals(&users, &holdings, Utc::now().date_naive());
    tracing::info!(users = users.len(), holdings = holdings.len(), "포트폴리오 가치 계산 완료");

    let written = insert_snapshots(pool, &snapshots).await?;
    stats.success = snapshots.len();
    stats.rows_written += written;
    stats.skipped += snapshots.len() - written;
    Ok(())
}

/// 활성 보유 카드와 카드별 최신 가격 스냅샷
async fn load_holdings(pool: &PgPool) -> Result<Vec<Holding>> {
    let rows: Vec<(String, Option<String>, Option<Value>)> = sqlx::query_as(
        r#"
        SELECT i.userid, i.variant, p.prices
        FROM pf_inventory i
        LEFT JOIN LATERAL (
            SELECT cp.prices
            FROM pfdata_cardprices cp
            WHERE cp.cardid = i.cardid
            ORDER BY cp.updated DESC
            LIMIT 1
        ) p ON TRUE
        WHERE i.status = TRUE
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(userid, variant, prices)| Holding {
            userid,
            variant,
            prices,
        })
        .collect())
}

/// 스냅샷 삽입. 같은 날 이미 기록된 사용자는 건너뜁니다.
pub async fn insert_snapshots(pool: &PgPool, snapshots: &[PortfolioSnapshot]) -> Result<usize> {
    let mut written = 0;

    for chunk in snapshots.chunks(500) {
        let userids: Vec<&str> = chunk.iter().map(|s| s.userid.as_str()).collect();
        let values: Vec<Decimal> = chunk.iter().map(|s| s.value).collect();
        let dates: Vec<NaiveDate> = chunk.iter().map(|s| s.date).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pf_portfoliosnapshots (userid, value, date, timestamp)
            SELECT u.userid, u.value, u.date, NOW()
            FROM UNNEST($1::text[], $2::numeric[], $3::date[]) AS u(userid, value, date)
            ON CONFLICT (userid, date) DO NOTHING
            "#,
        )
        .bind(&userids)
        .bind(&values)
        .bind(&dates)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}
