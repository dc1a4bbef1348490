//! 카드 카탈로그 API 클라이언트.
//!
//! 세트 목록과 세트별 카드 목록을 페이지 단위로 조회합니다.
//! API 키가 있으면 `X-Api-Key` 헤더로 전달합니다.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{build_http_client, ensure_success};
use crate::config::ApiConfig;
use crate::Result;

/// 페이지당 최대 항목 수
pub const PAGE_SIZE: u32 = 250;

/// 페이지 응답 공통 형식
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_count: u32,
}

impl<T> Page<T> {
    /// 전체 페이지 수
    pub fn total_pages(&self) -> u32 {
        let size = if self.page_size == 0 {
            PAGE_SIZE
        } else {
            self.page_size
        };
        self.total_count.div_ceil(size)
    }
}

pub type CardPage = Page<ApiCard>;

/// 세트 이미지 URL
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetImages {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// API 세트 정보
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub printed_total: Option<i32>,
    #[serde(default)]
    pub total: Option<i32>,
    #[serde(default)]
    pub legalities: Value,
    #[serde(default)]
    pub ptcgo_code: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub images: SetImages,
}

/// 카드가 속한 세트 (ID만 사용)
#[derive(Debug, Clone, Deserialize)]
pub struct CardSetRef {
    pub id: String,
}

/// 카드 이미지 URL
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardImages {
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

/// API 카드 정보.
///
/// 자주 쓰는 필드만 타입으로 두고 나머지는 `extra`에 그대로 보관합니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCard {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub supertype: Option<String>,
    pub number: String,
    #[serde(default)]
    pub hp: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub regulation_mark: Option<String>,
    pub set: CardSetRef,
    #[serde(default)]
    pub images: CardImages,
    #[serde(default)]
    pub tcgplayer: Option<Value>,
    #[serde(default)]
    pub cardmarket: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiCard {
    /// 원본 JSON 필드 (없으면 null)
    pub fn field(&self, name: &str) -> Value {
        self.extra.get(name).cloned().unwrap_or(Value::Null)
    }

    /// TCGPlayer 시세 스냅샷 (`tcgplayer.prices`)
    pub fn tcgplayer_prices(&self) -> Option<&Value> {
        self.tcgplayer.as_ref()?.get("prices").filter(|v| !v.is_null())
    }

    /// TCGPlayer 상품 링크 (`tcgplayer.url`)
    pub fn tcgplayer_url(&self) -> Option<&str> {
        self.tcgplayer.as_ref()?.get("url")?.as_str()
    }

    /// TCGPlayer 시세 기준일 (`tcgplayer.updatedAt`)
    pub fn tcgplayer_updated_at(&self) -> Option<&str> {
        self.tcgplayer.as_ref()?.get("updatedAt")?.as_str()
    }
}

/// 카드 카탈로그 API 클라이언트
#[derive(Debug, Clone)]
pub struct CardApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CardApiClient {
    /// 새 클라이언트 생성
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// 설정에서 클라이언트 생성
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        if config.card_api_key.is_none() {
            tracing::warn!("PTCG_API_KEY 미설정, 비인증 요청으로 진행합니다");
        }
        Ok(Self::new(
            build_http_client(config.http_timeout())?,
            &config.card_api_base_url,
            config.card_api_key.clone(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "카드 API 요청");

        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = ensure_success("카드", request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// 세트 목록 한 페이지 조회
    pub async fn fetch_sets_page(&self, page: u32) -> Result<Page<ApiSet>> {
        self.get_json(
            "/v2/sets",
            &[
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ],
        )
        .await
    }

    /// 전체 세트 목록 조회
    pub async fn fetch_sets(&self) -> Result<Vec<ApiSet>> {
        let first = self.fetch_sets_page(1).await?;
        let pages = first.total_pages();
        let mut sets = first.data;

        for page in 2..=pages {
            sets.extend(self.fetch_sets_page(page).await?.data);
        }

        tracing::info!(count = sets.len(), pages, "세트 목록 조회 완료");
        Ok(sets)
    }

    /// 세트의 카드 목록 한 페이지 조회
    pub async fn fetch_cards_page(&self, set_id: &str, page: u32) -> Result<CardPage> {
        self.get_json(
            "/v2/cards",
            &[
                ("q", format!("set.id:{}", set_id)),
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn client(base_url: &str, api_key: Option<&str>) -> CardApiClient {
        CardApiClient::new(
            build_http_client(Duration::from_secs(5)).unwrap(),
            base_url,
            api_key.map(str::to_string),
        )
    }

    #[test]
    fn test_total_pages() {
        let page: Page<ApiSet> = Page {
            data: vec![],
            page: 1,
            page_size: 250,
            count: 250,
            total_count: 501,
        };
        assert_eq!(page.total_pages(), 3);
    }

    #[tokio::test]
    async fn test_fetch_sets_sends_api_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/sets")
            .match_header("x-api-key", "secret")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"id":"sv1","name":"Scarlet & Violet","series":"Scarlet & Violet",
                "printedTotal":198,"total":258,"legalities":{"standard":"Legal"},
                "releaseDate":"2023/03/31","updatedAt":"2023/03/31 15:45:00",
                "images":{"symbol":"https://img/sv1/symbol.png","logo":"https://img/sv1/logo.png"}}],
                "page":1,"pageSize":250,"count":1,"totalCount":1}"#,
            )
            .create_async()
            .await;

        let sets = client(&server.url(), Some("secret")).fetch_sets().await.unwrap();
        mock.assert_async().await;
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].id, "sv1");
        assert_eq!(sets[0].printed_total, Some(198));
        assert_eq!(sets[0].images.logo.as_deref(), Some("https://img/sv1/logo.png"));
    }

    #[tokio::test]
    async fn test_fetch_cards_page_keeps_extra_fields() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/cards")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "set.id:sv1".into()),
                Matcher::UrlEncoded("page".into(), "2".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"id":"sv1-1","name":"Pineco","supertype":"Pokémon","number":"1",
                "set":{"id":"sv1"},"images":{"small":"https://img/1.png","large":"https://img/1_hires.png"},
                "attacks":[{"name":"Tackle"}],
                "tcgplayer":{"url":"https://prices/tcgplayer/sv1-1","updatedAt":"2024/06/14","prices":{"normal":{"market":0.05}}}}],
                "page":2,"pageSize":250,"count":1,"totalCount":251}"#,
            )
            .create_async()
            .await;

        let page = client(&server.url(), None).fetch_cards_page("sv1", 2).await.unwrap();
        let card = &page.data[0];
        assert_eq!(page.total_pages(), 2);
        assert_eq!(card.set.id, "sv1");
        assert_eq!(card.tcgplayer_updated_at(), Some("2024/06/14"));
        assert!(card.tcgplayer_prices().is_some());
        assert_eq!(card.tcgplayer_url(), Some("https://prices/tcgplayer/sv1-1"));
        assert!(card.field("attacks").is_array());
        assert!(card.field("rules").is_null());
    }

    #[tokio::test]
    async fn test_error_status_is_data_source_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/sets")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = client(&server.url(), None).fetch_sets().await.unwrap_err();
        assert!(matches!(err, crate::CollectorError::DataSource(_)));
    }
}
