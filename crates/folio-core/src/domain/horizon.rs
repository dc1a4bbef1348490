//! 조회 기간(lookback horizon)과 이전 가격 탐색.
//!
//! 각 기간의 이전 가격은 두 단계로 결정됩니다:
//!
//! 1. **WINDOW**: 목표일 ± 허용 오차 구간 안의 모든 관측 가격 평균
//! 2. **FALLBACK**: 구간에 관측치가 없으면 구간 시작 이전의 마지막 관측 가격
//!
//! 두 단계 모두 실패하면 `NO_DATA`로 표시하고 가격은 비워 둡니다.

use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 하루 동안 관측된 가격의 합계와 건수.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayTotal {
    pub sum: Decimal,
    pub count: u32,
}

impl DayTotal {
    pub fn single(price: Decimal) -> Self {
        Self { sum: price, count: 1 }
    }

    pub fn add(&mut self, price: Decimal) {
        self.sum += price;
        self.count += 1;
    }

    /// 그날의 평균 가격
    pub fn mean(&self) -> Decimal {
        if self.count == 0 {
            return Decimal::ZERO;
        }
        self.sum / Decimal::from(self.count)
    }
}

/// 날짜별 관측 합계 (오름차순).
pub type DailyPrices = BTreeMap<NaiveDate, DayTotal>;

/// 전일 비교 구간 길이 (일).
pub const PREVIOUS_DAY_WINDOW_DAYS: u64 = 7;

/// 가격 변동 조회 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Horizon {
    /// 1주
    Week,
    /// 1개월
    Month,
    /// 3개월
    Quarter,
    /// 6개월
    HalfYear,
    /// 1년
    Year,
}

impl Horizon {
    /// 분석 테이블 컬럼 순서와 동일한 전체 기간 목록.
    pub const ALL: [Horizon; 5] = [
        Horizon::Week,
        Horizon::Month,
        Horizon::Quarter,
        Horizon::HalfYear,
        Horizon::Year,
    ];

    /// 컬럼 접미사 (`previous_price_1w` 등).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Week => "1w",
            Self::Month => "1m",
            Self::Quarter => "3m",
            Self::HalfYear => "6m",
            Self::Year => "1y",
        }
    }

    /// 목표일 허용 오차 (일). 기간이 길수록 넓어집니다.
    pub fn tolerance_days(&self) -> u64 {
        match self {
            Self::Week => 3,
            Self::Month => 5,
            Self::Quarter => 10,
            Self::HalfYear => 15,
            Self::Year => 30,
        }
    }

    /// 현재 날짜 기준 목표일. 월 단위 기간은 달력 기준으로 계산합니다.
    pub fn target_date(&self, current: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Week => current.checked_sub_days(Days::new(7)),
            Self::Month => current.checked_sub_months(Months::new(1)),
            Self::Quarter => current.checked_sub_months(Months::new(3)),
            Self::HalfYear => current.checked_sub_months(Months::new(6)),
            Self::Year => current.checked_sub_months(Months::new(12)),
        }
    }

    /// 배열 인덱스 (`Horizon::ALL` 기준).
    pub fn index(&self) -> usize {
        match self {
            Self::Week => 0,
            Self::Month => 1,
            Self::Quarter => 2,
            Self::HalfYear => 3,
            Self::Year => 4,
        }
    }
}

/// 이전 가격을 어떤 방식으로 찾았는지.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    /// 허용 오차 구간 내 관측치
    Window,
    /// 구간 이전 마지막 관측치
    Fallback,
    /// 관측치 없음
    NoData,
}

impl PriceSource {
    /// DB 저장용 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "WINDOW",
            Self::Fallback => "FALLBACK",
            Self::NoData => "NO_DATA",
        }
    }
}

/// 이전 가격 탐색 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLookup {
    pub price: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub source: PriceSource,
}

impl PriceLookup {
    pub const NO_DATA: PriceLookup = PriceLookup {
        price: None,
        date: None,
        source: PriceSource::NoData,
    };
}

/// 이전 가격 탐색 구간 (양 끝 포함).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    /// 목표일
    pub target: NaiveDate,
    /// 구간 시작일
    pub earliest: NaiveDate,
    /// 구간 종료일 (항상 현재 날짜보다 이전)
    pub latest: NaiveDate,
}

impl LookbackWindow {
    /// 기간별 탐색 구간: 목표일 ± 허용 오차, 종료일은 현재 날짜 - 1일로 제한.
    pub fn for_horizon(horizon: Horizon, current: NaiveDate) -> Option<Self> {
        let target = horizon.target_date(current)?;
        let tolerance = Days::new(horizon.tolerance_days());
        let earliest = target.checked_sub_days(tolerance)?;
        let upper = target.checked_add_days(tolerance)?;
        let yesterday = current.checked_sub_days(Days::new(1))?;

        Some(Self {
            target,
            earliest,
            latest: upper.min(yesterday),
        })
    }

    /// 전일 비교 구간: 최근 7일 중 현재 날짜에 가장 가까운 관측일.
    pub fn previous_day(current: NaiveDate) -> Option<Self> {
        let target = current.checked_sub_days(Days::new(1))?;
        let earliest = current.checked_sub_days(Days::new(PREVIOUS_DAY_WINDOW_DAYS))?;

        Some(Self {
            target,
            earliest,
            latest: target,
        })
    }

    /// 날짜별 관측치에서 이전 가격을 찾습니다.
    ///
    /// 구간 안의 관측치가 있으면 전부의 평균을 쓰고, 날짜는 구간 안의
    /// 마지막 관측일입니다. 없으면 구간 시작 이전 마지막 관측일의 평균을 씁니다.
    pub fn resolve(&self, daily: &DailyPrices) -> PriceLookup {
        if self.earliest <= self.latest {
            let mut total = DayTotal::default();
            let mut last_date = None;
            for (date, day) in daily.range(self.earliest..=self.latest) {
                total.sum += day.sum;
                total.count += day.count;
                last_date = Some(*date);
            }

            if total.count > 0 {
                return PriceLookup {
                    price: Some(total.mean()),
                    date: last_date,
                    source: PriceSource::Window,
                };
            }
        }

        match daily.range(..self.earliest).next_back() {
            Some((date, day)) => PriceLookup {
                price: Some(day.mean()),
                date: Some(*date),
                source: PriceSource::Fallback,
            },
            None => PriceLookup::NO_DATA,
        }
    }
}
