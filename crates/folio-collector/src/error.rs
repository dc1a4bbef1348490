//! 에러 타입 정의.

use folio_core::FolioError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 데이터베이스 에러
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP 요청 에러
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 데이터 소스 에러 (카드 API, TCGPlayer, 환율 API 등)
    #[error("Data source error: {0}")]
    DataSource(String),

    /// 오브젝트 스토리지 에러
    #[error("Storage error: {0}")]
    Storage(String),

    /// 스케줄러 에러
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// 도메인 에러
    #[error(transparent)]
    Core(#[from] FolioError),
}

impl From<std::env::VarError> for CollectorError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for CollectorError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Self::Scheduler(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CollectorError::DataSource("빈 응답".to_string());
        assert_eq!(err.to_string(), "Data source error: 빈 응답");

        let err: CollectorError = FolioError::InvalidStatus("DONE".to_string()).into();
        assert!(matches!(err, CollectorError::Core(_)));
    }
}
