//! TCGPlayer 가격 API 클라이언트.
//!
//! client-credentials 방식으로 토큰을 받은 뒤, 상품 ID 묶음 단위로
//! 시세를 조회합니다.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::{build_http_client, ensure_success};
use crate::config::ApiConfig;
use crate::error::CollectorError;
use crate::Result;

/// 한 번의 가격 조회에 포함할 최대 상품 수
pub const PRODUCT_CHUNK_SIZE: usize = 50;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PricingResponse {
    #[serde(default)]
    results: Vec<TcgPrice>,
}

/// 상품/하위 타입별 시세
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcgPrice {
    pub product_id: i64,
    /// 시장가 (거래가 없으면 null)
    #[serde(default)]
    pub market_price: Option<Decimal>,
    /// 하위 타입 (Normal, Holofoil, Reverse Holofoil 등)
    #[serde(default)]
    pub sub_type_name: String,
}

/// TCGPlayer API 클라이언트
#[derive(Debug, Clone)]
pub struct TcgPlayerClient {
    client: reqwest::Client,
    base_url: String,
    public_key: Option<String>,
    private_key: Option<String>,
}

impl TcgPlayerClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        public_key: Option<String>,
        private_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_key,
            private_key,
        }
    }

    /// 설정에서 클라이언트 생성
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Ok(Self::new(
            build_http_client(config.http_timeout())?,
            &config.tcgplayer_base_url,
            config.tcgplayer_public_key.clone(),
            config.tcgplayer_private_key.clone(),
        ))
    }

    /// 액세스 토큰 발급.
    ///
    /// 자격 증명이 없으면 설정 에러를 반환합니다.
    pub async fn access_token(&self) -> Result<String> {
        let (Some(public_key), Some(private_key)) = (&self.public_key, &self.private_key) else {
            return Err(CollectorError::Config(
                "TCGP_PUBLIC / TCGP_PRIVATE 환경변수가 설정되지 않았습니다".to_string(),
            ));
        };

        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", public_key.as_str()),
                ("client_secret", private_key.as_str()),
            ])
            .send()
            .await?;

        let token: TokenResponse = ensure_success("TCGPlayer", response).await?.json().await?;
        tracing::debug!(expires_in = ?token.expires_in, "TCGPlayer 토큰 발급");
        Ok(token.access_token)
    }

    /// 상품 ID 목록의 시세 조회 (최대 `PRODUCT_CHUNK_SIZE`개).
    pub async fn fetch_prices(&self, token: &str, product_ids: &[i64]) -> Result<Vec<TcgPrice>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = product_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/pricing/product/{}", self.base_url, ids);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let body: PricingResponse = ensure_success("TCGPlayer", response).await?.json().await?;
        Ok(body.results)
    }
}
