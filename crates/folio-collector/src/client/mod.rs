//! 외부 API 클라이언트.

pub mod card_api;
pub mod currency;
pub mod product_link;
pub mod tcgplayer;

pub use card_api::{ApiCard, ApiSet, CardApiClient, CardPage};
pub use currency::{CurrencyClient, CurrencyRates};
pub use product_link::ProductLinkResolver;
pub use tcgplayer::{TcgPlayerClient, TcgPrice};

use crate::error::CollectorError;
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::time::Duration;

/// 타임아웃이 설정된 공용 HTTP 클라이언트 생성
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("folio-collector/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(CollectorError::Http)
}

/// 응답 상태 확인. 실패 시 본문을 포함한 DataSource 에러.
pub(crate) async fn ensure_success(
    source: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollectorError::DataSource(format!(
        "{} API 오류: {} - {}",
        source, status, body
    )))
}

/// API 날짜 문자열 파싱 (`2024/06/14` 또는 `2024-06-14`)
pub fn parse_api_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

/// API 일시 문자열 파싱 (`2024/06/14 10:20:00`)
pub fn parse_api_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y/%m/%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
