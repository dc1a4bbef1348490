//! TCGPlayer 상품 링크 해석.
//!
//! 카드 API의 `tcgplayer.url`은 TCGPlayer 상품 페이지로 리다이렉트됩니다.
//! 리다이렉트를 따라가지 않고 `Location` 헤더에서 상품 ID를 꺼냅니다.

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::CollectorError;
use crate::Result;

/// `/product/<id>` 경로에서 상품 ID 추출
pub fn parse_product_id(location: &str) -> Option<i64> {
    let (_, rest) = location.split_once("/product/")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// 리다이렉트를 따라가지 않는 상품 링크 해석기
#[derive(Debug, Clone)]
pub struct ProductLinkResolver {
    client: reqwest::Client,
}

impl ProductLinkResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(concat!("folio-collector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CollectorError::Http)?;
        Ok(Self { client })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(config.http_timeout())
    }

    /// 링크가 가리키는 상품 ID.
    ///
    /// 리다이렉트 위치에 상품 경로가 없으면 `None`, 리다이렉트가 아닌 응답은 에러입니다.
    pub async fn resolve(&self, url: &str) -> Result<Option<i64>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match location {
            Some(location) if status.is_redirection() => {
                tracing::trace!(url, location = %location, "상품 링크 리다이렉트");
                Ok(parse_product_id(&location))
            }
            _ => Err(CollectorError::DataSource(format!(
                "상품 링크 리다이렉트 없음: {} ({})",
                url, status
            ))),
        }
    }
}
