//! 환율 API 클라이언트 (USD 기준).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{build_http_client, ensure_success};
use crate::config::ApiConfig;
use crate::error::CollectorError;
use crate::Result;

/// 기준 통화
pub const BASE_CURRENCY: &str = "USD";

/// `/latest` 응답
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyRates {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub rates: BTreeMap<String, Decimal>,
}

impl CurrencyRates {
    /// 성공 여부와 기준 통화 확인
    pub fn validate(&self) -> Result<()> {
        if !self.success || self.base != BASE_CURRENCY {
            return Err(CollectorError::DataSource(format!(
                "잘못된 환율 응답 (success={}, base={})",
                self.success, self.base
            )));
        }
        Ok(())
    }

    /// 3자리 통화 코드만 골라 반환
    pub fn iso_rates(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.rates
            .iter()
            .filter(|(code, _)| code.chars().count() == 3)
            .map(|(code, rate)| (code.as_str(), *rate))
    }

    /// 환율 기준 시각. `date`를 우선하고 없으면 `timestamp`(초)를 사용합니다.
    pub fn quoted_at(&self) -> Option<DateTime<Utc>> {
        self.date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
            .or_else(|| self.timestamp.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }
}

/// 환율 API 클라이언트
#[derive(Debug, Clone)]
pub struct CurrencyClient {
    client: reqwest::Client,
    base_url: String,
}

impl CurrencyClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 설정에서 클라이언트 생성
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Ok(Self::new(
            build_http_client(config.http_timeout())?,
            &config.currency_base_url,
        ))
    }

    /// 최신 환율 조회 및 검증
    pub async fn latest(&self) -> Result<CurrencyRates> {
        let response = self
            .client
            .get(format!("{}/latest", self.base_url))
            .send()
            .await?;

        let rates: CurrencyRates = ensure_success("환율", response).await?.json().await?;
        rates.validate()?;
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn client(base_url: &str) -> CurrencyClient {
        CurrencyClient::new(build_http_client(Duration::from_secs(5)).unwrap(), base_url)
    }

    #[tokio::test]
    async fn test_latest_parses_rates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success":true,"timestamp":1718409600,"date":"2024-06-15T00:00:00.000Z",
                "base":"USD","rates":{"EUR":0.93,"JPY":157.2,"USDT":1.0}}"#,
            )
            .create_async()
            .await;

        let rates = client(&server.url()).latest().await.unwrap();
        let iso: Vec<_> = rates.iso_rates().collect();
        assert_eq!(iso, vec![("EUR", dec!(0.93)), ("JPY", dec!(157.2))]);
        assert_eq!(
            rates.quoted_at(),
            DateTime::from_timestamp(1718409600, 0)
        );
    }

    #[tokio::test]
    async fn test_non_usd_base_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"base":"EUR","rates":{"USD":1.07}}"#)
            .create_async()
            .await;

        let err = client(&server.url()).latest().await.unwrap_err();
        assert!(matches!(err, CollectorError::DataSource(_)));
    }

    #[test]
    fn test_quoted_at_falls_back_to_timestamp() {
        let rates = CurrencyRates {
            success: true,
            timestamp: Some(1718409600),
            date: Some("not a date".to_string()),
            base: "USD".to_string(),
            rates: BTreeMap::new(),
        };
        assert_eq!(rates.quoted_at(), DateTime::from_timestamp(1718409600, 0));
    }
}
