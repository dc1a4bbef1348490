//! 도메인 에러 타입.

use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error)]
pub enum FolioError {
    /// 알 수 없는 추적 상태 문자열
    #[error("알 수 없는 추적 상태: {0}")]
    InvalidStatus(String),

    /// 알 수 없는 실행 방식 문자열
    #[error("알 수 없는 실행 방식: {0}")]
    InvalidMethod(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FolioError::InvalidStatus("DONE".to_string());
        assert_eq!(err.to_string(), "알 수 없는 추적 상태: DONE");

        let err = FolioError::InvalidMethod("cron".to_string());
        assert_eq!(err.to_string(), "알 수 없는 실행 방식: cron");
    }
}
