//! 가격 이력 관측치.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 가격 변동 분석의 키.
///
/// 일반 카드는 (카드, 변형), 그레이딩 카드는 (카드, 변형, 등급),
/// 실드 상품은 상품 ID만으로 식별됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    /// 카드 ID 또는 실드 상품 ID
    pub item_id: String,
    /// 변형 (normal, holofoil, reverseHolofoil 등)
    pub variant: Option<String>,
    /// 그레이딩 등급 (예: "PSA 10")
    pub grade: Option<String>,
}

impl ItemKey {
    /// 일반 카드 키.
    pub fn card(item_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            variant: Some(variant.into()),
            grade: None,
        }
    }

    /// 그레이딩 카드 키.
    pub fn graded(
        item_id: impl Into<String>,
        variant: impl Into<String>,
        grade: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            variant: Some(variant.into()),
            grade: Some(grade.into()),
        }
    }

    /// 실드 상품 키.
    pub fn sealed(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            variant: None,
            grade: None,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.item_id)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        if let Some(grade) = &self.grade {
            write!(f, "/{}", grade)?;
        }
        Ok(())
    }
}

/// 가격 이력 테이블의 한 행.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub key: ItemKey,
    pub price: Decimal,
    /// 관측일 (소스 기준 날짜)
    pub observed_on: NaiveDate,
}

impl PriceObservation {
    pub fn new(key: ItemKey, price: Decimal, observed_on: NaiveDate) -> Self {
        Self {
            key,
            price,
            observed_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_display() {
        assert_eq!(ItemKey::card("sv1-1", "holofoil").to_string(), "sv1-1/holofoil");
        assert_eq!(
            ItemKey::graded("sv1-1", "normal", "PSA 10").to_string(),
            "sv1-1/normal/PSA 10"
        );
        assert_eq!(ItemKey::sealed("etb-151").to_string(), "etb-151");
    }

    #[test]
    fn test_item_key_ordering() {
        let a = ItemKey::card("a", "normal");
        let b = ItemKey::card("a", "reverseHolofoil");
        let c = ItemKey::card("b", "normal");
        let mut keys = vec![c.clone(), b.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b, c]);
    }
}
