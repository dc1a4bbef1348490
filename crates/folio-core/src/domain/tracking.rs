//! 파티션 처리 추적 상태.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FolioError;

/// 파티션 추적 상태.
///
/// 실행마다 모든 파티션이 `Pending`으로 초기화되고,
/// `InProgress`를 거쳐 `Completed` 또는 `Failed`로 끝납니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TrackingStatus {
    /// DB 저장용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingStatus {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(FolioError::InvalidStatus(other.to_string())),
        }
    }
}

/// 추적 테이블의 한 행.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// 파티션 키 (세트 ID)
    pub partition_key: String,
    pub status: TrackingStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub record_count: i64,
    pub error_message: Option<String>,
}

impl TrackingRecord {
    /// 새 파티션의 초기 행.
    pub fn pending(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            status: TrackingStatus::Pending,
            processed_at: None,
            record_count: 0,
            error_message: None,
        }
    }
}

/// 작업 실행 방식 (로그 기록용).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationMethod {
    /// CLI 수동 실행
    Manual,
    /// 스케줄러 실행
    System,
}

impl InvocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::System => "SYSTEM",
        }
    }
}

impl fmt::Display for InvocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationMethod {
    type Err = FolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MANUAL" => Ok(Self::Manual),
            "SYSTEM" => Ok(Self::System),
            _ => Err(FolioError::InvalidMethod(s.to_string())),
        }
    }
}

/// 파티션 하나의 처리 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionResult {
    /// staging에 기록된 행 수
    Completed { records: u64 },
    Failed { error: String },
}

/// 파티션 처리 결과 누적용.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOutcome {
    pub partition_key: String,
    pub result: PartitionResult,
}

impl PartitionOutcome {
    pub fn completed(partition_key: impl Into<String>, records: u64) -> Self {
        Self {
            partition_key: partition_key.into(),
            result: PartitionResult::Completed { records },
        }
    }

    pub fn failed(partition_key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            result: PartitionResult::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.result, PartitionResult::Failed { .. })
    }
}
