//! 파티션(세트) 단위 가격 변동 계산.
//!
//! 가격 이력 관측치를 키별 날짜 합계로 묶은 뒤, 현재 가격과 각 기간의
//! 이전 가격을 비교해 분석 테이블의 한 행을 만듭니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::horizon::{DailyPrices, DayTotal, Horizon, LookbackWindow, PriceLookup, PriceSource};
use super::observation::{ItemKey, PriceObservation};

/// 현재 가격 기준일을 정하는 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentDateScope {
    /// 파티션 전체의 최신 관측일. 그 날 관측되지 않은 키는 제외됩니다.
    PartitionLatest,
    /// 키별 최신 관측일 (거래가 드문 그레이딩 카드용)
    PerItemLatest,
}

/// 한 비교 기준에 대한 가격 변동.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub previous_price: Option<Decimal>,
    pub previous_date: Option<NaiveDate>,
    pub price_change: Option<Decimal>,
    pub percentage_change: Option<Decimal>,
    pub source: PriceSource,
}

impl PriceChange {
    /// 현재 가격과 탐색된 이전 가격으로 변동을 계산합니다.
    pub fn between(current: Decimal, lookup: PriceLookup) -> Self {
        Self {
            previous_price: lookup.price,
            previous_date: lookup.date,
            price_change: lookup.price.map(|previous| current - previous),
            percentage_change: percentage_change(current, lookup.price),
            source: lookup.source,
        }
    }
}

/// `(current - previous) / previous * 100`.
///
/// 이전 가격이 없거나 0이면 `None`.
pub fn percentage_change(current: Decimal, previous: Option<Decimal>) -> Option<Decimal> {
    let previous = previous.filter(|p| !p.is_zero())?;
    current
        .checked_sub(previous)?
        .checked_div(previous)?
        .checked_mul(Decimal::ONE_HUNDRED)
}

/// 분석 테이블(staging/production)의 한 행.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChangeRow {
    pub key: ItemKey,
    pub current_price: Decimal,
    pub latest_update_date: NaiveDate,
    /// 전일 비교
    pub previous: PriceChange,
    /// `Horizon::ALL` 순서의 기간별 비교
    pub horizons: [PriceChange; 5],
}

impl PriceChangeRow {
    /// 특정 기간의 변동.
    pub fn horizon(&self, horizon: Horizon) -> &PriceChange {
        &self.horizons[horizon.index()]
    }

    pub fn previous_update_date(&self) -> Option<NaiveDate> {
        self.previous.previous_date
    }
}

/// 관측치를 키별 날짜 합계로 묶습니다.
pub fn daily_totals(observations: &[PriceObservation]) -> BTreeMap<ItemKey, DailyPrices> {
    let mut by_key: BTreeMap<ItemKey, DailyPrices> = BTreeMap::new();

    for obs in observations {
        by_key
            .entry(obs.key.clone())
            .or_default()
            .entry(obs.observed_on)
            .or_default()
            .add(obs.price);
    }

    by_key
}

/// 한 파티션의 관측치로 가격 변동 행을 계산합니다.
///
/// 반환되는 행은 키 순서로 정렬되어 있습니다.
pub fn compute_partition(
    observations: &[PriceObservation],
    scope: CurrentDateScope,
) -> Vec<PriceChangeRow> {
    let by_key = daily_totals(observations);

    let partition_latest = by_key
        .values()
        .filter_map(|daily| daily.keys().next_back())
        .max()
        .copied();

    let Some(partition_latest) = partition_latest else {
        return Vec::new();
    };

    by_key
        .into_iter()
        .filter_map(|(key, daily)| {
            let current_date = match scope {
                CurrentDateScope::PartitionLatest => partition_latest,
                CurrentDateScope::PerItemLatest => *daily.keys().next_back()?,
            };
            let current_price = daily.get(&current_date).map(DayTotal::mean)?;
            Some(compute_row(key, current_date, current_price, &daily))
        })
        .collect()
}

fn compute_row(
    key: ItemKey,
    current_date: NaiveDate,
    current_price: Decimal,
    daily: &DailyPrices,
) -> PriceChangeRow {
    let lookup = |window: Option<LookbackWindow>| {
        window
            .map(|w| w.resolve(daily))
            .unwrap_or(PriceLookup::NO_DATA)
    };

    let previous = PriceChange::between(
        current_price,
        lookup(LookbackWindow::previous_day(current_date)),
    );
    let horizons = Horizon::ALL.map(|horizon| {
        PriceChange::between(
            current_price,
            lookup(LookbackWindow::for_horizon(horizon, current_date)),
        )
    });

    PriceChangeRow {
        key,
        current_price,
        latest_update_date: current_date,
        previous,
        horizons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn obs(key: &ItemKey, price: Decimal, date: NaiveDate) -> PriceObservation {
        PriceObservation::new(key.clone(), price, date)
    }

    #[test]
    fn test_percentage_change_guards() {
        assert_eq!(percentage_change(dec!(12), Some(dec!(10))), Some(dec!(20)));
        assert_eq!(percentage_change(dec!(5), Some(dec!(10))), Some(dec!(-50)));
        assert_eq!(percentage_change(dec!(5), Some(Decimal::ZERO)), None);
        assert_eq!(percentage_change(dec!(5), None), None);
    }

    #[test]
    fn test_daily_totals_mean_per_day() {
        let key = ItemKey::graded("sv1-1", "normal", "PSA 10");
        let day = d(2024, 6, 1);
        let observations = vec![
            obs(&key, dec!(100), day),
            obs(&key, dec!(110), day),
            obs(&key, dec!(120), day),
        ];

        let daily = daily_totals(&observations);
        assert_eq!(daily[&key][&day].count, 3);
        assert_eq!(daily[&key][&day].mean(), dec!(110));
    }

    #[test]
    fn test_partition_latest_skips_stale_items() {
        let fresh = ItemKey::card("a", "normal");
        let stale = ItemKey::card("b", "normal");
        let today = d(2024, 6, 15);
        let observations = vec![
            obs(&fresh, dec!(2), today),
            obs(&stale, dec!(3), d(2024, 6, 14)),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, fresh);

        let rows = compute_partition(&observations, CurrentDateScope::PerItemLatest);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].latest_update_date, d(2024, 6, 14));
    }

    #[test]
    fn test_previous_day_window_average() {
        let key = ItemKey::card("a", "holofoil");
        let today = d(2024, 6, 15);
        let observations = vec![
            // 전일 구간 [06-08, 06-14] 이전
            obs(&key, dec!(50), d(2024, 6, 7)),
            obs(&key, dec!(8), d(2024, 6, 10)),
            obs(&key, dec!(9), d(2024, 6, 14)),
            obs(&key, dec!(10), today),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        let row = &rows[0];
        assert_eq!(row.previous.previous_price, Some(dec!(8.5)));
        assert_eq!(row.previous_update_date(), Some(d(2024, 6, 14)));
        assert_eq!(row.previous.price_change, Some(dec!(1.5)));
        assert_eq!(row.previous.source, PriceSource::Window);
    }

    #[test]
    fn test_only_current_observation_yields_nulls() {
        let key = ItemKey::sealed("etb");
        let observations = vec![obs(&key, dec!(50), d(2024, 6, 15))];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        let row = &rows[0];
        assert_eq!(row.previous.previous_price, None);
        assert_eq!(row.previous.percentage_change, None);
        for horizon in Horizon::ALL {
            assert_eq!(row.horizon(horizon).source, PriceSource::NoData);
            assert_eq!(row.horizon(horizon).price_change, None);
        }
    }

    #[test]
    fn test_zero_previous_price_has_null_percentage() {
        let key = ItemKey::card("promo", "normal");
        let today = d(2024, 6, 15);
        let observations = vec![
            obs(&key, Decimal::ZERO, d(2024, 6, 8)),
            obs(&key, dec!(4), today),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        let week = rows[0].horizon(Horizon::Week);
        assert_eq!(week.previous_price, Some(Decimal::ZERO));
        assert_eq!(week.price_change, Some(dec!(4)));
        assert_eq!(week.percentage_change, None);
    }

    #[test]
    fn test_long_horizons_use_fallback() {
        let key = ItemKey::card("base1-4", "holofoil");
        let today = d(2024, 6, 15);
        let observations = vec![
            // 1년 구간 [2023-05-16, 2023-07-15] 이전
            obs(&key, dec!(200), d(2023, 1, 10)),
            obs(&key, dec!(300), today),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        let year = rows[0].horizon(Horizon::Year);
        assert_eq!(year.source, PriceSource::Fallback);
        assert_eq!(year.previous_price, Some(dec!(200)));
        assert_eq!(year.percentage_change, Some(dec!(50)));
    }

    #[test]
    fn test_window_prices_average_all_sales() {
        let key = ItemKey::graded("swsh12-186", "holofoil", "PSA 10");
        let observations = vec![
            obs(&key, dec!(10), d(2024, 6, 5)),
            obs(&key, dec!(20), d(2024, 6, 9)),
            obs(&key, dec!(8), d(2024, 6, 13)),
            obs(&key, dec!(12), d(2024, 6, 14)),
            obs(&key, dec!(30), d(2024, 6, 15)),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PerItemLatest);
        let row = &rows[0];
        assert_eq!(row.current_price, dec!(30));

        // 1주 구간 [06-05, 06-11]
        let week = row.horizon(Horizon::Week);
        assert_eq!(week.source, PriceSource::Window);
        assert_eq!(week.previous_price, Some(dec!(15)));
        assert_eq!(week.previous_date, Some(d(2024, 6, 9)));
        assert_eq!(week.percentage_change, Some(dec!(100)));

        // 전일 구간 [06-08, 06-14]
        assert_eq!(row.previous.previous_price, Some(dec!(40) / dec!(3)));
        assert_eq!(row.previous_update_date(), Some(d(2024, 6, 14)));
    }

    #[test]
    fn test_empty_partition() {
        assert!(compute_partition(&[], CurrentDateScope::PartitionLatest).is_empty());
    }

    #[test]
    fn test_rows_sorted_by_key() {
        let today = d(2024, 6, 15);
        let yesterday = today.checked_sub_days(Days::new(1)).unwrap();
        let b = ItemKey::card("b", "normal");
        let a = ItemKey::card("a", "normal");
        let observations = vec![
            obs(&b, dec!(1), today),
            obs(&a, dec!(1), yesterday),
            obs(&a, dec!(2), today),
        ];

        let rows = compute_partition(&observations, CurrentDateScope::PartitionLatest);
        let keys: Vec<_> = rows.iter().map(|r| r.key.item_id.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
