//! # Folio Core
//!
//! 카드 가격 수집기의 핵심 도메인 모델과 계산 로직을 제공합니다.
//!
//! 이 크레이트는 수집기 전반에서 사용되는 기본 타입을 제공합니다:
//! - 가격 관측치 및 아이템 키 (카드, 그레이딩 카드, 실드 상품)
//! - 조회 기간(1주 ~ 1년)별 이전 가격 탐색
//! - 파티션(세트) 단위 가격 변동 계산
//! - 파티션 추적 상태
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;

pub use domain::*;
pub use error::*;
pub use logging::*;
