//! 테스트용 메모리 저장소.

use async_trait::async_trait;
use chrono::Utc;
use folio_core::{PriceChangeRow, PriceObservation, TrackingRecord, TrackingStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::store::{AnalysisStore, TrackingCounts};
use crate::error::CollectorError;
use crate::Result;

#[derive(Default)]
struct State {
    partitions: BTreeSet<String>,
    tracking: BTreeMap<String, TrackingRecord>,
    observations: HashMap<String, Vec<PriceObservation>>,
    staging: Vec<PriceChangeRow>,
    production: Vec<PriceChangeRow>,
    failing_loads: BTreeSet<String>,
    fail_prepare: bool,
    fail_promote: bool,
    fail_cleanup: bool,
}

/// 실패 주입이 가능한 메모리 저장소
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) fn with_partitions(partitions: &[&str]) -> Self {
        let store = Self::default();
        for partition in partitions {
            store.add_partition(partition);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_partition(&self, partition: &str) {
        self.lock().partitions.insert(partition.to_string());
    }

    pub(crate) fn add_observations(&self, partition: &str, observations: Vec<PriceObservation>) {
        self.lock()
            .observations
            .entry(partition.to_string())
            .or_default()
            .extend(observations);
    }

    pub(crate) fn fail_loading(&self, partition: &str) {
        self.lock().failing_loads.insert(partition.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_loads.clear();
        state.fail_prepare = false;
        state.fail_promote = false;
        state.fail_cleanup = false;
    }

    pub(crate) fn fail_prepare(&self, enabled: bool) {
        self.lock().fail_prepare = enabled;
    }

    pub(crate) fn fail_promote(&self, enabled: bool) {
        self.lock().fail_promote = enabled;
    }

    pub(crate) fn fail_cleanup(&self, enabled: bool) {
        self.lock().fail_cleanup = enabled;
    }

    pub(crate) fn production_rows(&self) -> Vec<PriceChangeRow> {
        self.lock().production.clone()
    }

    pub(crate) fn staging_rows(&self) -> Vec<PriceChangeRow> {
        self.lock().staging.clone()
    }

    pub(crate) fn tracking(&self) -> Vec<TrackingRecord> {
        self.lock().tracking.values().cloned().collect()
    }

    fn update(&self, partition: &str, apply: impl FnOnce(&mut TrackingRecord)) -> Result<()> {
        let mut state = self.lock();
        let record = state
            .tracking
            .get_mut(partition)
            .ok_or_else(|| CollectorError::DataSource(format!("추적 행 없음: {}", partition)))?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn prepare_staging(&self) -> Result<()> {
        let mut state = self.lock();
        if state.fail_prepare {
            return Err(CollectorError::DataSource("staging 생성 실패".to_string()));
        }
        state.staging.clear();
        Ok(())
    }

    async fn seed_tracking(&self) -> Result<u64> {
        let mut state = self.lock();
        let missing: Vec<String> = state
            .partitions
            .iter()
            .filter(|p| !state.tracking.contains_key(*p))
            .cloned()
            .collect();
        for partition in &missing {
            state
                .tracking
                .insert(partition.clone(), TrackingRecord::pending(partition.clone()));
        }
        Ok(missing.len() as u64)
    }

    async fn reset_tracking(&self) -> Result<()> {
        let mut state = self.lock();
        for record in state.tracking.values_mut() {
            *record = TrackingRecord::pending(record.partition_key.clone());
        }
        Ok(())
    }

    async fn pending_partitions(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tracking
            .values()
            .filter(|t| t.status == TrackingStatus::Pending)
            .map(|t| t.partition_key.clone())
            .collect())
    }

    async fn mark_in_progress(&self, partition: &str) -> Result<()> {
        self.update(partition, |t| {
            t.status = TrackingStatus::InProgress;
            t.processed_at = Some(Utc::now());
        })
    }

    async fn load_observations(&self, partition: &str) -> Result<Vec<PriceObservation>> {
        let state = self.lock();
        if state.failing_loads.contains(partition) {
            return Err(CollectorError::DataSource(format!(
                "가격 이력 조회 실패: {}",
                partition
            )));
        }
        Ok(state.observations.get(partition).cloned().unwrap_or_default())
    }

    async fn append_staging(&self, rows: &[PriceChangeRow]) -> Result<u64> {
        self.lock().staging.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn mark_completed(&self, partition: &str, record_count: u64) -> Result<()> {
        self.update(partition, |t| {
            t.status = TrackingStatus::Completed;
            t.processed_at = Some(Utc::now());
            t.record_count = record_count as i64;
            t.error_message = None;
        })
    }

    async fn mark_failed(&self, partition: &str, error: &str) -> Result<()> {
        self.update(partition, |t| {
            t.status = TrackingStatus::Failed;
            t.processed_at = Some(Utc::now());
            t.error_message = Some(error.to_string());
        })
    }

    async fn tracking_counts(&self) -> Result<TrackingCounts> {
        let state = self.lock();
        Ok(TrackingCounts {
            total: state.tracking.len() as i64,
            completed: state
                .tracking
                .values()
                .filter(|t| t.status == TrackingStatus::Completed)
                .count() as i64,
        })
    }

    async fn failed_partitions(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tracking
            .values()
            .filter(|t| t.status == TrackingStatus::Failed)
            .map(|t| t.partition_key.clone())
            .collect())
    }

    async fn promote_staging(&self) -> Result<u64> {
        let mut state = self.lock();
        if state.fail_promote {
            return Err(CollectorError::DataSource("운영 테이블 삽입 실패".to_string()));
        }
        state.production = state.staging.clone();
        Ok(state.production.len() as u64)
    }

    async fn cleanup(&self) -> Result<()> {
        let mut state = self.lock();
        if state.fail_cleanup {
            return Err(CollectorError::DataSource("staging 정리 실패".to_string()));
        }
        state.staging.clear();
        let now = Utc::now();
        for record in state.tracking.values_mut() {
            record.status = TrackingStatus::Completed;
            record.processed_at = Some(now);
        }
        Ok(())
    }

    async fn tracking_records(&self) -> Result<Vec<TrackingRecord>> {
        Ok(self.tracking())
    }
}
