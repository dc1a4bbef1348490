//! 분석 종류별 테이블과 키 구성.

use folio_core::{CurrentDateScope, Horizon};
use std::fmt;
use std::str::FromStr;

use crate::error::CollectorError;

/// 가격 변동 분석 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    /// 일반 카드 (카드, 변형)
    Card,
    /// 그레이딩 카드 (카드, 변형, 등급)
    Graded,
    /// 실드 상품
    Sealed,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [Self::Card, Self::Graded, Self::Sealed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Graded => "graded",
            Self::Sealed => "sealed",
        }
    }

    /// 작업 로그의 caller 이름
    pub fn job_name(&self) -> &'static str {
        match self {
            Self::Card => "collectAnalysis",
            Self::Graded => "collectGradedAnalysis",
            Self::Sealed => "collectSealedAnalysis",
        }
    }

    pub fn tracking_table(&self) -> &'static str {
        match self {
            Self::Card => "pfanalysis_tracking_price_changes_daily",
            Self::Graded => "pfanalysis_tracking_graded_price_changes_daily",
            Self::Sealed => "pfanalysis_tracking_sealed_price_changes_daily",
        }
    }

    pub fn staging_table(&self) -> &'static str {
        match self {
            Self::Card => "pfanalysis_staging_price_changes_daily",
            Self::Graded => "pfanalysis_staging_graded_price_changes_daily",
            Self::Sealed => "pfanalysis_staging_sealed_price_changes_daily",
        }
    }

    pub fn production_table(&self) -> &'static str {
        match self {
            Self::Card => "pfanalysis_price_changes_daily",
            Self::Graded => "pfanalysis_graded_price_changes_daily",
            Self::Sealed => "pfanalysis_sealed_price_changes_daily",
        }
    }

    /// 현재 가격 기준일 범위. 거래가 드문 그레이딩 카드만 키별 최신일을 씁니다.
    pub fn scope(&self) -> CurrentDateScope {
        match self {
            Self::Graded => CurrentDateScope::PerItemLatest,
            Self::Card | Self::Sealed => CurrentDateScope::PartitionLatest,
        }
    }

    /// 분석 테이블의 키 컬럼
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Card => &["cardid", "variant"],
            Self::Graded => &["cardid", "variant", "grade"],
            Self::Sealed => &["sealedid"],
        }
    }

    pub fn has_variant(&self) -> bool {
        !matches!(self, Self::Sealed)
    }

    pub fn has_grade(&self) -> bool {
        matches!(self, Self::Graded)
    }

    /// 파티션(세트)의 가격 이력 조회 SQL. `$1` = setid.
    ///
    /// 결과 컬럼: item_id, variant, grade, price, observed_on
    pub fn observation_query(&self) -> &'static str {
        match self {
            Self::Card => {
                r#"
                SELECT h.cardid AS item_id, h.variant AS variant, NULL::text AS grade,
                       h.price AS price, h.updatedsource::date AS observed_on
                FROM pf_cards_price_history h
                JOIN pfdata_cards c ON c.cardid = h.cardid
                WHERE c.setid = $1
                  AND h.price IS NOT NULL
                  AND h.updatedsource IS NOT NULL
                "#
            }
            Self::Graded => {
                r#"
                SELECT g.cardid AS item_id, g.variant AS variant, g.grade AS grade,
                       g.price AS price, g.sold_date::date AS observed_on
                FROM pf_graded_cards_price_history g
                JOIN pfdata_cards c ON c.cardid = g.cardid
                WHERE c.setid = $1
                  AND g.price IS NOT NULL
                  AND g.sold_date IS NOT NULL
                "#
            }
            Self::Sealed => {
                r#"
                SELECT h.sealedid AS item_id, NULL::text AS variant, NULL::text AS grade,
                       h.price AS price, h.updatedsource::date AS observed_on
                FROM pf_sealed_price_history h
                JOIN pf_sealed s ON s.sealedid = h.sealedid
                WHERE s.setid = $1
                  AND h.price IS NOT NULL
                  AND h.updatedsource IS NOT NULL
                "#
            }
        }
    }

    /// staging 테이블 컬럼과 배열 타입 (UNNEST 바인딩 순서).
    pub fn staging_columns(&self) -> Vec<(String, &'static str)> {
        let mut columns: Vec<(String, &'static str)> = self
            .key_columns()
            .iter()
            .map(|c| (c.to_string(), "text[]"))
            .collect();

        columns.push(("current_price".to_string(), "numeric[]"));
        columns.push(("previous_price".to_string(), "numeric[]"));
        columns.push(("percentage_change".to_string(), "numeric[]"));
        columns.push(("latest_update_date".to_string(), "date[]"));
        columns.push(("previous_update_date".to_string(), "date[]"));

        for horizon in Horizon::ALL {
            let code = horizon.code();
            columns.push((format!("previous_price_{}", code), "numeric[]"));
            columns.push((format!("price_change_{}", code), "numeric[]"));
            columns.push((format!("percentage_change_{}", code), "numeric[]"));
        }

        columns.push(("price_source_previous".to_string(), "text[]"));
        for horizon in Horizon::ALL {
            columns.push((format!("price_source_{}", horizon.code()), "text[]"));
        }

        columns
    }

    /// staging 일괄 삽입 SQL
    pub fn staging_insert_sql(&self) -> String {
        let columns = self.staging_columns();
        let names = columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let params = columns
            .iter()
            .enumerate()
            .map(|(i, (_, ty))| format!("${}::{}", i + 1, ty))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) SELECT * FROM UNNEST({})",
            self.staging_table(),
            names,
            params
        )
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "card" | "cards" => Ok(Self::Card),
            "graded" => Ok(Self::Graded),
            "sealed" => Ok(Self::Sealed),
            other => Err(CollectorError::Config(format!("알 수 없는 분석 종류: {}", other))),
        }
    }
}
