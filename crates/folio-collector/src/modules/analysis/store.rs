//! 분석 파이프라인 저장소 경계.

use async_trait::async_trait;
use folio_core::{PriceChangeRow, PriceObservation, TrackingRecord};

use crate::Result;

/// 추적 테이블 완료 현황
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingCounts {
    pub total: i64,
    pub completed: i64,
}

impl TrackingCounts {
    /// 모든 파티션이 COMPLETED인지
    pub fn all_completed(&self) -> bool {
        self.total == self.completed
    }
}

/// staging/추적/운영 테이블 접근.
///
/// 한 번의 실행에서 호출 순서는 항상
/// 초기화 → (파티션별 상태 전이 + staging 적재) → 승격 → 정리 입니다.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// staging 테이블을 비운 채로 다시 만듭니다.
    async fn prepare_staging(&self) -> Result<()>;

    /// 추적되지 않은 파티션을 PENDING으로 추가하고 추가된 수를 반환합니다.
    async fn seed_tracking(&self) -> Result<u64>;

    /// 모든 추적 행을 PENDING으로 되돌립니다.
    async fn reset_tracking(&self) -> Result<()>;

    /// PENDING 파티션 목록 (키 순)
    async fn pending_partitions(&self) -> Result<Vec<String>>;

    async fn mark_in_progress(&self, partition: &str) -> Result<()>;

    /// 파티션의 가격 이력
    async fn load_observations(&self, partition: &str) -> Result<Vec<PriceObservation>>;

    /// 계산 결과를 staging에 추가하고 기록된 행 수를 반환합니다.
    async fn append_staging(&self, rows: &[PriceChangeRow]) -> Result<u64>;

    async fn mark_completed(&self, partition: &str, record_count: u64) -> Result<()>;

    async fn mark_failed(&self, partition: &str, error: &str) -> Result<()>;

    async fn tracking_counts(&self) -> Result<TrackingCounts>;

    /// FAILED 파티션 목록 (키 순)
    async fn failed_partitions(&self) -> Result<Vec<String>>;

    /// 한 트랜잭션에서 운영 테이블을 staging 내용으로 교체하고 행 수를 반환합니다.
    ///
    /// 실패하면 운영 테이블은 바뀌지 않습니다.
    async fn promote_staging(&self) -> Result<u64>;

    /// staging을 비우고 모든 추적 행을 COMPLETED로 표시합니다.
    async fn cleanup(&self) -> Result<()>;

    /// 추적 테이블 전체 (키 순)
    async fn tracking_records(&self) -> Result<Vec<TrackingRecord>>;
}
