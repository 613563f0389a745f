//! Date ranges used by reports, summaries and the calendar.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ClinicError;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ClinicError> {
        if end < start {
            return Err(ClinicError::validation(
                "end",
                "end date must not be before start date",
            ));
        }
        Ok(Self { start, end })
    }

    /// A single day.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The whole calendar month.
    pub fn month(month: YearMonth) -> Self {
        Self {
            start: month.first_day(),
            end: month.last_day(),
        }
    }

    /// First of the month through `today`; the default report window.
    pub fn month_to_date(today: NaiveDate) -> Self {
        Self {
            start: YearMonth::of(today).first_day(),
            end: today,
        }
    }

    /// First instant of the period.
    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// First instant after the period (exclusive upper bound).
    pub fn end_datetime_exclusive(&self) -> NaiveDateTime {
        self.end
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start_datetime() && at < self.end_datetime_exclusive()
    }

    /// `YYYYMMDD_YYYYMMDD`, used in export file names.
    pub fn file_stamp(&self) -> String {
        format!("{}_{}", self.start.format("%Y%m%d"), self.end.format("%Y%m%d"))
    }
}

/// A calendar month; budgets are tracked per month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, ClinicError> {
        if !(1..=12).contains(&month) {
            return Err(ClinicError::validation("month", "month must be between 1 and 12"));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(ClinicError::validation("year", "year is out of range"));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let first = self.first_day();
        first
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(first)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a form date-time; seconds are optional and `T` or a space may
/// separate date and time. A bare date means midnight.
pub fn parse_datetime(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Serde adapter for [`parse_datetime`].
pub fn de_datetime<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_datetime(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date-time: {}", raw)))
}

/// Serde adapter for optional date-times; `null` and `""` mean absent.
pub fn de_opt_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDateTime>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_datetime(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date-time: {}", raw))),
    }
}
