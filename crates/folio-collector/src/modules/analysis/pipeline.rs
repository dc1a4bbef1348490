//! 파티션 단위 staging 파이프라인.
//!
//! 1. 초기화: staging 재생성, 추적 행 추가 및 PENDING 초기화
//! 2. PENDING 파티션을 키 순서로 하나씩 처리 (실패는 기록 후 계속)
//! 3. 모든 파티션이 COMPLETED일 때만 운영 테이블을 트랜잭션으로 교체
//! 4. 교체 후 staging 정리

use folio_core::{compute_partition, InvocationMethod, PartitionOutcome, PartitionResult};
use sqlx::PgPool;

use super::kind::AnalysisKind;
use super::postgres::PgAnalysisStore;
use super::store::AnalysisStore;
use crate::job_log::{JobOutcome, JobRun};
use crate::Result;

/// 한 번의 분석 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub kind: AnalysisKind,
    /// 운영 테이블 교체까지 성공했는지
    pub state: bool,
    /// 실패한 파티션 수 + 오케스트레이션 에러 수
    pub errors: usize,
    /// 파티션별 처리 결과 (처리 순서)
    pub outcomes: Vec<PartitionOutcome>,
    /// 운영 테이블에 기록된 행 수 (교체하지 않았으면 None)
    pub promoted_rows: Option<u64>,
    /// 실행 종료 시점의 FAILED 파티션
    pub failed_partitions: Vec<String>,
}

impl AnalysisReport {
    fn new(kind: AnalysisKind) -> Self {
        Self {
            kind,
            state: false,
            errors: 0,
            outcomes: Vec::new(),
            promoted_rows: None,
            failed_partitions: Vec::new(),
        }
    }

    /// staging에 기록된 총 행 수
    pub fn staged_rows(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o.result {
                PartitionResult::Completed { records } => records,
                PartitionResult::Failed { .. } => 0,
            })
            .sum()
    }
}

/// 초기화: staging 재생성 → 신규 파티션 추가 → 전체 PENDING
async fn initialize<S: AnalysisStore + ?Sized>(store: &S) -> Result<Vec<String>> {
    store.prepare_staging().await?;
    let seeded = store.seed_tracking().await?;
    store.reset_tracking().await?;
    let pending = store.pending_partitions().await?;

    tracing::info!(seeded, pending = pending.len(), "분석 초기화 완료");
    Ok(pending)
}

/// 파티션 하나 처리. 에러는 호출자가 FAILED로 기록합니다.
async fn process_partition<S: AnalysisStore + ?Sized>(
    store: &S,
    kind: AnalysisKind,
    partition: &str,
) -> Result<u64> {
    store.mark_in_progress(partition).await?;

    let observations = store.load_observations(partition).await?;
    let rows = compute_partition(&observations, kind.scope());
    let written = store.append_staging(&rows).await?;

    store.mark_completed(partition, written).await?;
    Ok(written)
}

/// PENDING 파티션을 순서대로 처리하고 결과를 누적합니다.
pub async fn process_partitions<S: AnalysisStore + ?Sized>(
    store: &S,
    kind: AnalysisKind,
    partitions: &[String],
) -> Vec<PartitionOutcome> {
    let mut outcomes = Vec::with_capacity(partitions.len());

    for partition in partitions {
        match process_partition(store, kind, partition).await {
            Ok(records) => {
                tracing::debug!(kind = %kind, set_id = %partition, records, "파티션 처리 완료");
                outcomes.push(PartitionOutcome::completed(partition, records));
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(kind = %kind, set_id = %partition, error = %message, "파티션 처리 실패");
                if let Err(mark_err) = store.mark_failed(partition, &message).await {
                    tracing::warn!(set_id = %partition, error = %mark_err, "FAILED 상태 기록 실패");
                }
                outcomes.push(PartitionOutcome::failed(partition, message));
            }
        }
    }

    outcomes
}

/// 전체 파이프라인 실행.
///
/// 에러는 보고서에 누적되며 호출자에게 전파되지 않습니다.
pub async fn run_pipeline<S: AnalysisStore + ?Sized>(store: &S, kind: AnalysisKind) -> AnalysisReport {
    let mut report = AnalysisReport::new(kind);

    let pending = match initialize(store).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "분석 초기화 실패, 실행 중단");
            report.errors += 1;
            return report;
        }
    };

    report.outcomes = process_partitions(store, kind, &pending).await;
    report.errors += report.outcomes.iter().filter(|o| o.is_failed()).count();

    finalize(store, &mut report).await;
    report
}

/// 전 파티션 완료 시 운영 테이블 교체, 아니면 실패 목록만 기록.
async fn finalize<S: AnalysisStore + ?Sized>(store: &S, report: &mut AnalysisReport) {
    let kind = report.kind;

    let counts = match store.tracking_counts().await {
        Ok(counts) => counts,
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "추적 현황 조회 실패");
            report.errors += 1;
            return;
        }
    };

    if !counts.all_completed() {
        match store.failed_partitions().await {
            Ok(failed) => report.failed_partitions = failed,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "실패 파티션 조회 실패");
                report.errors += 1;
            }
        }
        tracing::warn!(
            kind = %kind,
            total = counts.total,
            completed = counts.completed,
            failed = ?report.failed_partitions,
            "미완료 파티션 존재, 운영 테이블 유지"
        );
        return;
    }

    match store.promote_staging().await {
        Ok(rows) => {
            report.promoted_rows = Some(rows);
            report.state = true;
            tracing::info!(kind = %kind, rows, "운영 테이블 교체 완료");
        }
        Err(e) => {
            tracing::error!(kind = %kind, error = %e, "운영 테이블 교체 실패, 롤백");
            report.errors += 1;
            return;
        }
    }

    if let Err(e) = store.cleanup().await {
        tracing::warn!(kind = %kind, error = %e, "staging 정리 실패");
        report.errors += 1;
    }
}

/// 작업 로그로 감싼 분석 실행.
pub async fn run_analysis(
    pool: &PgPool,
    kind: AnalysisKind,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(pool, kind.job_name(), method).await?;
    let store = PgAnalysisStore::new(pool.clone(), kind);

    let report = run_pipeline(&store, kind).await;
    tracing::info!(
        kind = %kind,
        partitions = report.outcomes.len(),
        staged_rows = report.staged_rows(),
        promoted_rows = ?report.promoted_rows,
        errors = report.errors,
        "분석 실행 요약"
    );

    Ok(run.complete(report.state, report.errors).await)
}

/// 모든 분석 종류를 순서대로 실행합니다. 한 종류의 실패는 다음 종류에 영향을 주지 않습니다.
pub async fn run_all_analyses(
    pool: &PgPool,
    method: InvocationMethod,
) -> Vec<(AnalysisKind, Result<JobOutcome>)> {
    let mut results = Vec::with_capacity(AnalysisKind::ALL.len());
    for kind in AnalysisKind::ALL {
        results.push((kind, run_analysis(pool, kind, method).await));
    }
    results
}
