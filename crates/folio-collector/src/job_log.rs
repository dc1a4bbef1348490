//! 작업 실행 로그 (`pfdata_logs_collect`).
//!
//! 모든 수집 작업은 시작 시 `log_start`로 행을 만들고, 끝날 때
//! `log_end`로 종료 시각/상태/에러 수를 기록합니다.

use folio_core::InvocationMethod;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::time::Instant;

use crate::{CollectionStats, Result};

/// 작업 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 작업 실행 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// 구조적 실패 없이 끝났는지
    pub state: bool,
    /// 항목 단위 에러 수 (구조적 실패 포함)
    pub errors: usize,
    /// `pfdata_logs_collect` 행 ID
    pub log_id: i64,
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        if self.state {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

/// 작업 시작 기록.
pub async fn log_start(pool: &PgPool, job: &str, method: InvocationMethod) -> Result<i64> {
    let log_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO pfdata_logs_collect (caller, method, timestart, status)
        VALUES ($1, $2, NOW(), $3)
        RETURNING id::bigint
        "#,
    )
    .bind(job)
    .bind(method.as_str())
    .bind(JobStatus::Started.as_str())
    .fetch_one(pool)
    .await?;

    tracing::info!(job, method = %method, log_id, "작업 시작");
    Ok(log_id)
}

/// 작업 종료 기록.
pub async fn log_end(
    pool: &PgPool,
    log_id: i64,
    status: JobStatus,
    errors: usize,
    log_path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pfdata_logs_collect
        SET timeend = NOW(), status = $2, errors = $3, logpath = $4
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .bind(status.as_str())
    .bind(errors as i32)
    .bind(log_path)
    .execute(pool)
    .await?;

    Ok(())
}

/// `log_start`/`log_end`로 감싼 한 번의 작업 실행.
pub struct JobRun<'a> {
    pool: &'a PgPool,
    job: &'static str,
    log_id: i64,
    started: Instant,
}

impl<'a> JobRun<'a> {
    /// 로그 행을 만들고 실행을 시작합니다.
    pub async fn start(pool: &'a PgPool, job: &'static str, method: InvocationMethod) -> Result<Self> {
        let log_id = log_start(pool, job, method).await?;
        Ok(Self {
            pool,
            job,
            log_id,
            started: Instant::now(),
        })
    }

    pub fn log_id(&self) -> i64 {
        self.log_id
    }

    /// 수집 작업 종료. `result`가 에러면 구조적 실패로 기록합니다.
    pub async fn finish(self, mut stats: CollectionStats, result: Result<()>) -> JobOutcome {
        let state = match result {
            Ok(()) => true,
            Err(e) => {
                stats.record_error();
                tracing::error!(job = self.job, error = %e, "작업 실패");
                false
            }
        };
        stats.elapsed = self.started.elapsed();
        stats.log_summary(self.job);

        self.complete(state, stats.errors).await
    }

    /// 상태와 에러 수를 기록하고 결과를 반환합니다.
    ///
    /// 로그 갱신 실패는 결과를 바꾸지 않습니다.
    pub async fn complete(self, state: bool, errors: usize) -> JobOutcome {
        let outcome = JobOutcome {
            state,
            errors,
            log_id: self.log_id,
        };

        if let Err(e) = log_end(self.pool, self.log_id, outcome.status(), errors, None).await {
            tracing::warn!(job = self.job, log_id = self.log_id, error = %e, "작업 종료 기록 실패");
        }

        tracing::info!(
            job = self.job,
            log_id = self.log_id,
            state,
            errors,
            elapsed = format!("{:.1}s", self.started.elapsed().as_secs_f64()),
            "작업 종료"
        );
        outcome
    }
}
