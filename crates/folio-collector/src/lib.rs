//! 카드 시세 수집기.
//!
//! 외부 API(카드 메타데이터, TCGPlayer 시세, 환율)에서 데이터를 가져와
//! PostgreSQL에 저장하고, 세트 단위 가격 변동 분석과 포트폴리오
//! 스냅샷을 계산합니다.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod job_log;
pub mod modules;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use config::CollectorConfig;
pub use context::CollectorContext;
pub use error::{CollectorError, Result};
pub use job_log::JobOutcome;
pub use stats::CollectionStats;
