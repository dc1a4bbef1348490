//! 가격 변동 분석 (카드, 그레이딩 카드, 실드 상품).
//!
//! 세트 단위로 가격 변동을 계산해 staging에 쌓고, 모든 세트가 성공했을
//! 때만 운영 테이블을 교체합니다.

pub mod kind;
#[cfg(test)]
mod memory;
pub mod pipeline;
pub mod postgres;
pub mod store;

pub use kind::AnalysisKind;
pub use pipeline::{process_partitions, run_all_analyses, run_analysis, run_pipeline, AnalysisReport};
pub use postgres::PgAnalysisStore;
pub use store::{AnalysisStore, TrackingCounts};

use folio_core::TrackingRecord;
use sqlx::PgPool;

use crate::Result;

/// 분석 종류의 추적 테이블 조회
pub async fn list_tracking(pool: &PgPool, kind: AnalysisKind) -> Result<Vec<TrackingRecord>> {
    PgAnalysisStore::new(pool.clone(), kind)
        .tracking_records()
        .await
}
