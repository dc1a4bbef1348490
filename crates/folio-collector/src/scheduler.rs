//! cron 스케줄러 (데몬 모드).
//!
//! 세 가지 작업을 등록합니다:
//! - 야간: 세트 → 카드 → 상품 매핑 → 카드 시세 → 실드 시세 → 가격 변동 분석
//! - 환율
//! - 포트폴리오 스냅샷
//!
//! 각 작업의 실패는 로그만 남기고 다음 작업이나 다음 실행에 영향을 주지 않습니다.

use folio_core::InvocationMethod;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::context::CollectorContext;
use crate::job_log::JobOutcome;
use crate::modules::{self, CardCollectOptions, PriceMapOptions, SetCollectOptions};
use crate::Result;

const METHOD: InvocationMethod = InvocationMethod::System;

/// 작업 결과 로그
fn report(job: &str, result: Result<JobOutcome>) -> bool {
    match result {
        Ok(outcome) if outcome.state => {
            tracing::info!(job, errors = outcome.errors, log_id = outcome.log_id, "예약 작업 완료");
            true
        }
        Ok(outcome) => {
            tracing::warn!(job, errors = outcome.errors, log_id = outcome.log_id, "예약 작업 실패");
            false
        }
        Err(e) => {
            tracing::error!(job, error = %e, "예약 작업 실행 불가");
            false
        }
    }
}

/// 야간 수집 및 분석
pub async fn run_nightly(ctx: &CollectorContext) {
    let images = ctx.config.scheduler.upload_images;
    tracing::info!(images, "=== 야간 수집 시작 ===");

    let sets = SetCollectOptions { meta: true, images };
    report(
        modules::sets::JOB_NAME,
        modules::collect_sets(ctx, sets, METHOD).await,
    );

    let cards = CardCollectOptions {
        meta: true,
        images,
        set_id: None,
    };
    report(
        modules::cards::JOB_NAME,
        modules::collect_cards(ctx, cards, METHOD).await,
    );

    report(
        modules::price_map::JOB_NAME,
        modules::collect_price_map(ctx, PriceMapOptions::default(), METHOD).await,
    );

    report(
        modules::card_prices::JOB_NAME,
        modules::collect_card_prices(ctx, METHOD).await,
    );
    report(
        modules::sealed_prices::JOB_NAME,
        modules::collect_sealed_prices(ctx, METHOD).await,
    );

    for (kind, result) in modules::run_all_analyses(&ctx.pool, METHOD).await {
        report(kind.job_name(), result);
    }

    tracing::info!("=== 야간 수집 완료 ===");
}

pub async fn run_currency(ctx: &CollectorContext) {
    report(
        modules::currency_rates::JOB_NAME,
        modules::collect_currency_rates(ctx, METHOD).await,
    );
}

pub async fn run_portfolio(ctx: &CollectorContext) {
    report(
        modules::portfolio_values::JOB_NAME,
        modules::collect_portfolio_values(ctx, METHOD).await,
    );
}

/// 설정의 cron 표현식으로 작업을 등록한 스케줄러를 만듭니다.
pub async fn build_scheduler(ctx: Arc<CollectorContext>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let cron = ctx.config.scheduler.clone();

    let nightly_ctx = Arc::clone(&ctx);
    scheduler
        .add(Job::new_async(cron.nightly_cron.as_str(), move |_id, _lock| {
            let ctx = Arc::clone(&nightly_ctx);
            Box::pin(async move { run_nightly(&ctx).await })
        })?)
        .await?;

    let currency_ctx = Arc::clone(&ctx);
    scheduler
        .add(Job::new_async(cron.currency_cron.as_str(), move |_id, _lock| {
            let ctx = Arc::clone(&currency_ctx);
            Box::pin(async move { run_currency(&ctx).await })
        })?)
        .await?;

    let portfolio_ctx = Arc::clone(&ctx);
    scheduler
        .add(Job::new_async(cron.portfolio_cron.as_str(), move |_id, _lock| {
            let ctx = Arc::clone(&portfolio_ctx);
            Box::pin(async move { run_portfolio(&ctx).await })
        })?)
        .await?;

    tracing::info!(
        nightly = %cron.nightly_cron,
        currency = %cron.currency_cron,
        portfolio = %cron.portfolio_cron,
        "예약 작업 등록 완료"
    );
    Ok(scheduler)
}

/// 종료 신호를 받을 때까지 스케줄러를 실행합니다.
pub async fn run_daemon(ctx: Arc<CollectorContext>) -> Result<()> {
    let mut scheduler = build_scheduler(ctx).await?;
    scheduler.start().await?;
    tracing::info!("=== 데몬 모드 시작 ===");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "종료 신호 대기 실패");
    }
    tracing::info!("종료 신호 수신, 데몬 종료 중...");

    scheduler.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;

    fn noop_job(expr: &str) -> Result<Job> {
        Ok(Job::new_async(expr, |_id, _lock| Box::pin(async {}))?)
    }

    #[tokio::test]
    async fn test_default_cron_expressions_are_valid() {
        for expr in ["0 0 3 * * *", "0 0 * * * *", "0 30 5 * * *"] {
            assert!(noop_job(expr).is_ok(), "{}", expr);
        }
    }

    #[tokio::test]
    async fn test_invalid_cron_is_scheduler_error() {
        let Err(err) = noop_job("every night") else {
            panic!("잘못된 cron 표현식이 허용됨");
        };
        assert!(matches!(err, CollectorError::Scheduler(_)));
    }

    #[test]
    fn test_report_reflects_outcome() {
        let ok = JobOutcome {
            state: true,
            errors: 2,
            log_id: 7,
        };
        assert!(report("collectSets", Ok(ok)));
        assert!(!report("collectSets", Ok(JobOutcome { state: false, ..ok })));
        assert!(!report(
            "collectSets",
            Err(CollectorError::Config("missing".to_string()))
        ));
    }
}
