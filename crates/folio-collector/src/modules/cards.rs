//! 카드 메타데이터, 시세 스냅샷, 이미지 수집.
//!
//! 세트마다 카드 목록을 페이지 단위로 받아 `pfdata_cards`를 갱신하고,
//! 카드에 포함된 TCGPlayer 시세를 `pfdata_cardprices`에 스냅샷으로 남깁니다.

use chrono::NaiveDate;
use folio_core::InvocationMethod;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::client::{parse_api_date, ApiCard};
use crate::config::StorageConfig;
use crate::context::CollectorContext;
use crate::job_log::{JobOutcome, JobRun};
use crate::storage::{card_image_key, ImageStore, ImageUpload};
use crate::{CollectionStats, Result};

pub const JOB_NAME: &str = "collectCards";

/// 시세 스냅샷 출처
pub const PRICE_SOURCE: &str = "tcgplayer";

/// 카드 수집 옵션
#[derive(Debug, Clone, Default)]
pub struct CardCollectOptions {
    /// `pfdata_cards` 갱신
    pub meta: bool,
    /// 카드 이미지 업로드
    pub images: bool,
    /// 특정 세트만 수집
    pub set_id: Option<String>,
}

/// `pfdata_cards` 한 행
#[derive(Debug, Clone, PartialEq)]
pub struct CardRow {
    pub cardid: String,
    pub name: String,
    pub supertype: Option<String>,
    pub subtypes: Value,
    pub hp: Option<String>,
    pub types: Value,
    pub rules: Value,
    pub abilities: Value,
    pub attacks: Value,
    pub weaknesses: Value,
    pub resistances: Value,
    pub number: String,
    pub artist: Option<String>,
    pub rarity: Option<String>,
    pub regulation_mark: Option<String>,
    pub legalities: Value,
    pub images: Value,
    pub tcgplayer: Value,
    pub cardmarket: Value,
    pub setid: String,
}

impl CardRow {
    /// API 카드를 저장용 행으로 변환. 이미지 URL은 CDN 주소로 바꿉니다.
    pub fn from_api(card: &ApiCard, storage: &StorageConfig) -> Self {
        let set_id = &card.set.id;
        Self {
            cardid: card.id.clone(),
            name: card.name.clone(),
            supertype: card.supertype.clone(),
            subtypes: card.field("subtypes"),
            hp: card.hp.clone(),
            types: card.field("types"),
            rules: card.field("rules"),
            abilities: card.field("abilities"),
            attacks: card.field("attacks"),
            weaknesses: card.field("weaknesses"),
            resistances: card.field("resistances"),
            number: card.number.clone(),
            artist: card.artist.clone(),
            rarity: card.rarity.clone(),
            regulation_mark: card.regulation_mark.clone(),
            legalities: card.field("legalities"),
            images: json!({
                "small": storage.public_url(&card_image_key(set_id, &card.number, false)),
                "large": storage.public_url(&card_image_key(set_id, &card.number, true)),
            }),
            tcgplayer: card.tcgplayer.clone().unwrap_or(Value::Null),
            cardmarket: card.cardmarket.clone().unwrap_or(Value::Null),
            setid: set_id.clone(),
        }
    }
}

/// `pfdata_cardprices` 한 행
#[derive(Debug, Clone, PartialEq)]
pub struct CardPriceSnapshot {
    pub cardid: String,
    pub prices: Value,
    pub updated_source: NaiveDate,
}

impl CardPriceSnapshot {
    /// 시세 또는 기준일이 없는 카드는 None
    pub fn from_api(card: &ApiCard) -> Option<Self> {
        Some(Self {
            cardid: card.id.clone(),
            prices: card.tcgplayer_prices()?.clone(),
            updated_source: parse_api_date(card.tcgplayer_updated_at()?)?,
        })
    }
}

/// 카드의 업로드 대상 이미지 (일반, 고해상도)
pub fn card_images(card: &ApiCard) -> Vec<ImageUpload> {
    let mut uploads = Vec::with_capacity(2);
    if let Some(small) = &card.images.small {
        uploads.push(ImageUpload::new(
            small,
            card_image_key(&card.set.id, &card.number, false),
        ));
    }
    if let Some(large) = &card.images.large {
        uploads.push(ImageUpload::new(
            large,
            card_image_key(&card.set.id, &card.number, true),
        ));
    }
    uploads
}

/// 카드 수집 작업
pub async fn collect_cards(
    ctx: &CollectorContext,
    options: CardCollectOptions,
    method: InvocationMethod,
) -> Result<JobOutcome> {
    let run = JobRun::start(&ctx.pool, JOB_NAME, method).await?;
    let mut stats = CollectionStats::new();
    let result = sync_cards(ctx, &options, &mut stats).await;
    Ok(run.finish(stats, result).await)
}

async fn sync_cards(
    ctx: &CollectorContext,
    options: &CardCollectOptions,
    stats: &mut CollectionStats,
) -> Result<()> {
    let store = if options.images {
        Some(ctx.require_image_store()?)
    } else {
        None
    };

    let sets = match &options.set_id {
        Some(set_id) => vec![set_id.clone()],
        None => super::list_set_ids(&ctx.pool).await?,
    };
    stats.total = sets.len();
    tracing::info!(sets = sets.len(), "카드 수집 시작");

    for set_id in &sets {
        match collect_set_cards(ctx, set_id, options, store, stats).await {
            Ok(cards) if cards == 0 => stats.empty += 1,
            Ok(cards) => {
                stats.success += 1;
                tracing::info!(set_id = %set_id, cards, "세트 카드 수집 완료");
            }
            Err(e) => {
                stats.record_error();
                tracing::error!(set_id = %set_id, error = %e, "세트 카드 수집 실패");
            }
        }
    }

    Ok(())
}

/// 한 세트의 카드 수집. 첫 페이지 조회 실패는 세트 전체 실패입니다.
async fn collect_set_cards(
    ctx: &CollectorContext,
    set_id: &str,
    options: &CardCollectOptions,
    store: Option<&dyn ImageStore>,
    stats: &mut CollectionStats,
) -> Result<usize> {
    let cards = super::fetch_set_cards(ctx, set_id, stats).await?;
    if cards.is_empty() {
        return Ok(0);
    }

    if options.meta {
        let rows: Vec<CardRow> = cards
            .iter()
            .map(|c| CardRow::from_api(c, &ctx.config.storage))
            .collect();
        stats.rows_written += upsert_cards(&ctx.pool, &rows).await?;
    }

    let snapshots: Vec<CardPriceSnapshot> =
        cards.iter().filter_map(CardPriceSnapshot::from_api).collect();
    stats.skipped += cards.len() - snapshots.len();
    match insert_price_snapshots(&ctx.pool, &snapshots).await {
        Ok(written) => stats.rows_written += written,
        Err(e) => {
            stats.record_error();
            tracing::warn!(set_id, error = %e, "시세 스냅샷 저장 실패");
        }
    }

    if let Some(store) = store {
        let uploads: Vec<ImageUpload> = cards.iter().flat_map(card_images).collect();
        super::upload_images(&ctx.http, store, &uploads, stats).await;
    }

    Ok(cards.len())
}

/// `pfdata_cards` upsert (충돌 시 갱신)
pub async fn upsert_cards(pool: &PgPool, rows: &[CardRow]) -> Result<usize> {
    let mut written = 0;

    for chunk in rows.chunks(500) {
        let cardids: Vec<&str> = chunk.iter().map(|r| r.cardid.as_str()).collect();
        let names: Vec<&str> = chunk.iter().map(|r| r.name.as_str()).collect();
        let supertypes: Vec<Option<&str>> = chunk.iter().map(|r| r.supertype.as_deref()).collect();
        let subtypes: Vec<Value> = chunk.iter().map(|r| r.subtypes.clone()).collect();
        let hps: Vec<Option<&str>> = chunk.iter().map(|r| r.hp.as_deref()).collect();
        let types: Vec<Value> = chunk.iter().map(|r| r.types.clone()).collect();
        let rules: Vec<Value> = chunk.iter().map(|r| r.rules.clone()).collect();
        let abilities: Vec<Value> = chunk.iter().map(|r| r.abilities.clone()).collect();
        let attacks: Vec<Value> = chunk.iter().map(|r| r.attacks.clone()).collect();
        let weaknesses: Vec<Value> = chunk.iter().map(|r| r.weaknesses.clone()).collect();
        let resistances: Vec<Value> = chunk.iter().map(|r| r.resistances.clone()).collect();
        let numbers: Vec<&str> = chunk.iter().map(|r| r.number.as_str()).collect();
        let artists: Vec<Option<&str>> = chunk.iter().map(|r| r.artist.as_deref()).collect();
        let rarities: Vec<Option<&str>> = chunk.iter().map(|r| r.rarity.as_deref()).collect();
        let marks: Vec<Option<&str>> = chunk.iter().map(|r| r.regulation_mark.as_deref()).collect();
        let legalities: Vec<Value> = chunk.iter().map(|r| r.legalities.clone()).collect();
        let images: Vec<Value> = chunk.iter().map(|r| r.images.clone()).collect();
        let tcgplayer: Vec<Value> = chunk.iter().map(|r| r.tcgplayer.clone()).collect();
        let cardmarket: Vec<Value> = chunk.iter().map(|r| r.cardmarket.clone()).collect();
        let setids: Vec<&str> = chunk.iter().map(|r| r.setid.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pfdata_cards
                (cardid, name, supertype, subtypes, hp, types, rules, abilities, attacks,
                 weaknesses, resistances, number, artist, rarity, "regulationMark",
                 legalities, images, tcgplayer, cardmarket, setid)
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::jsonb[], $5::text[], $6::jsonb[],
                $7::jsonb[], $8::jsonb[], $9::jsonb[], $10::jsonb[], $11::jsonb[],
                $12::text[], $13::text[], $14::text[], $15::text[],
                $16::jsonb[], $17::jsonb[], $18::jsonb[], $19::jsonb[], $20::text[]
            )
            ON CONFLICT (cardid) DO UPDATE SET
                name = EXCLUDED.name,
                supertype = EXCLUDED.supertype,
                subtypes = EXCLUDED.subtypes,
                hp = EXCLUDED.hp,
                types = EXCLUDED.types,
                rules = EXCLUDED.rules,
                abilities = EXCLUDED.abilities,
                attacks = EXCLUDED.attacks,
                weaknesses = EXCLUDED.weaknesses,
                resistances = EXCLUDED.resistances,
                number = EXCLUDED.number,
                artist = EXCLUDED.artist,
                rarity = EXCLUDED.rarity,
                "regulationMark" = EXCLUDED."regulationMark",
                legalities = EXCLUDED.legalities,
                images = EXCLUDED.images,
                tcgplayer = EXCLUDED.tcgplayer,
                cardmarket = EXCLUDED.cardmarket,
                setid = EXCLUDED.setid
            "#,
        )
        .bind(&cardids)
        .bind(&names)
        .bind(&supertypes)
        .bind(&subtypes)
        .bind(&hps)
        .bind(&types)
        .bind(&rules)
        .bind(&abilities)
        .bind(&attacks)
        .bind(&weaknesses)
        .bind(&resistances)
        .bind(&numbers)
        .bind(&artists)
        .bind(&rarities)
        .bind(&marks)
        .bind(&legalities)
        .bind(&images)
        .bind(&tcgplayer)
        .bind(&cardmarket)
        .bind(&setids)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}

/// `pfdata_cardprices` 스냅샷 삽입 (이미 있으면 무시)
pub async fn insert_price_snapshots(pool: &PgPool, rows: &[CardPriceSnapshot]) -> Result<usize> {
    let mut written = 0;

    for chunk in rows.chunks(500) {
        let cardids: Vec<&str> = chunk.iter().map(|r| r.cardid.as_str()).collect();
        let prices: Vec<Value> = chunk.iter().map(|r| r.prices.clone()).collect();
        let dates: Vec<NaiveDate> = chunk.iter().map(|r| r.updated_source).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO pfdata_cardprices (cardid, source, prices, updatedsource, updated)
            SELECT u.cardid, $4, u.prices, u.updatedsource, NOW()
            FROM UNNEST($1::text[], $2::jsonb[], $3::date[]) AS u(cardid, prices, updatedsource)
            ON CONFLICT (cardid, source, updatedsource) DO NOTHING
            "#,
        )
        .bind(&cardids)
        .bind(&prices)
        .bind(&dates)
        .bind(PRICE_SOURCE)
        .execute(pool)
        .await?;

        written += result.rows_affected() as usize;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> StorageConfig {
        StorageConfig {
            endpoint: None,
            region: "auto".to_string(),
            bucket: None,
            access_key: None,
            secret_key: None,
            cdn_base_url: "https://cdn.example.com".to_string(),
            cache_control: "public".to_string(),
        }
    }

    fn api_card(tcgplayer: Option<Value>) -> ApiCard {
        let mut value = json!({
            "id": "sv1-25",
            "name": "Sprigatito",
            "supertype": "Pokémon",
            "subtypes": ["Basic"],
            "number": "25",
            "set": {"id": "sv1"},
            "images": {"small": "https://img/sv1/25.png", "large": "https://img/sv1/25_hires.png"},
            "attacks": [{"name": "Scratch"}]
        });
        if let Some(tcgplayer) = tcgplayer {
            value["tcgplayer"] = tcgplayer;
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_card_row_rewrites_images() {
        let row = CardRow::from_api(&api_card(None), &storage());
        assert_eq!(row.images["small"], "https://cdn.example.com/images/sv1/25.png");
        assert_eq!(row.images["large"], "https://cdn.example.com/images/sv1/25_hires.png");
        assert_eq!(row.subtypes, json!(["Basic"]));
        assert!(row.rules.is_null());
        assert!(row.tcgplayer.is_null());
    }

    #[test]
    fn test_price_snapshot_requires_prices_and_date() {
        assert!(CardPriceSnapshot::from_api(&api_card(None)).is_none());

        let card = api_card(Some(json!({"updatedAt": "2024/06/14"})));
        assert!(CardPriceSnapshot::from_api(&card).is_none());

        let card = api_card(Some(json!({
            "updatedAt": "2024/06/14",
            "prices": {"normal": {"market": 0.12}}
        })));
        let snapshot = CardPriceSnapshot::from_api(&card).unwrap();
        assert_eq!(snapshot.updated_source, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert_eq!(snapshot.prices["normal"]["market"], json!(0.12));
    }

    #[test]
    fn test_card_images_keys() {
        let keys: Vec<String> = card_images(&api_card(None)).into_iter().map(|u| u.key).collect();
        assert_eq!(keys, vec!["images/sv1/25.png", "images/sv1/25_hires.png"]);
    }
}
