//! Route handlers, grouped by resource.

pub mod appointments;
pub mod auth;
pub mod finance;
pub mod patients;
pub mod reports;
pub mod visits;

use axum::Json;
use chrono::NaiveDate;
use clinic_core::db;
use clinic_core::models::{Period, YearMonth};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// `?from=YYYY-MM-DD&to=YYYY-MM-DD`
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

impl PeriodQuery {
    /// Missing bounds default to the current month up to today.
    pub fn resolve(&self, today: NaiveDate) -> Result<Period, ApiError> {
        let end = self.to.unwrap_or(today);
        let start = self
            .from
            .unwrap_or_else(|| YearMonth::of(end).first_day());
        Ok(Period::new(start, end)?)
    }

    /// Like [`resolve`](Self::resolve), but `None` when neither bound is
    /// given.
    pub fn resolve_optional(&self, today: NaiveDate) -> Result<Option<Period>, ApiError> {
        if self.from.is_none() && self.to.is_none() {
            return Ok(None);
        }
        self.resolve(today).map(Some)
    }
}

/// `?year=&month=`, defaulting to the current month.
#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
}

impl MonthQuery {
    pub fn resolve(&self, today: NaiveDate) -> Result<YearMonth, ApiError> {
        let current = YearMonth::of(today);
        Ok(YearMonth::new(
            self.year.unwrap_or(current.year),
            self.month.unwrap_or(current.month),
        )?)
    }

    /// `None` when neither field is given.
    pub fn resolve_optional(&self, today: NaiveDate) -> Result<Option<YearMonth>, ApiError> {
        if self.year.is_none() && self.month.is_none() {
            return Ok(None);
        }
        self.resolve(today).map(Some)
    }
}

pub(crate) fn today() -> NaiveDate {
    db::now().date()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_defaults_to_month_to_date() {
        let period = PeriodQuery::default().resolve(date(2024, 5, 17)).unwrap();
        assert_eq!(period.start, date(2024, 5, 1));
        assert_eq!(period.end, date(2024, 5, 17));
    }

    #[test]
    fn test_period_from_only_end() {
        let query = PeriodQuery {
            from: None,
            to: Some(date(2024, 2, 10)),
        };
        let period = query.resolve(date(2024, 5, 17)).unwrap();
        assert_eq!(period.start, date(2024, 2, 1));
    }

    #[test]
    fn test_inverted_period_rejected() {
        let query = PeriodQuery {
            from: Some(date(2024, 5, 20)),
            to: Some(date(2024, 5, 1)),
        };
        assert!(query.resolve(date(2024, 5, 17)).is_err());
        assert!(PeriodQuery::default().resolve_optional(date(2024, 5, 17)).unwrap().is_none());
    }

    #[test]
    fn test_month_query() {
        let month = MonthQuery {
            year: None,
            month: Some(2),
        }
        .resolve(date(2024, 5, 17))
        .unwrap();
        assert_eq!(month, YearMonth { year: 2024, month: 2 });
        assert!(MonthQuery {
            year: None,
            month: Some(13)
        }
        .resolve(date(2024, 5, 17))
        .is_err());
    }
}
