//! Report export as CSV or JSON.
//!
//! Reports are read-only and scoped to one doctor.

mod financial;
mod visits;

pub use financial::*;
pub use visits::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::ledger::Ledger;
use crate::models::{DoctorId, Period, TransactionFilter};
use crate::ClinicError;

/// Which report to build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Financial,
    Visits,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Financial => "financial",
            ReportKind::Visits => "visits",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "financial" => Ok(ReportKind::Financial),
            "visits" => Ok(ReportKind::Visits),
            _ => Err(ClinicError::validation(
                "kind",
                "must be financial or visits",
            )),
        }
    }
}

/// Output encoding of a report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            _ => Err(ClinicError::validation("format", "must be csv or json")),
        }
    }
}

/// Suggested download name, e.g. `financial_report_20240501_20240531.csv`.
pub fn file_name(kind: ReportKind, period: &Period, format: ReportFormat) -> String {
    format!(
        "{}_report_{}.{}",
        kind,
        period.file_stamp(),
        format.extension()
    )
}

/// Builds reports from the ledger and visit log.
pub struct ReportExporter<'a> {
    db: &'a Database,
}

impl<'a> ReportExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Transactions in the period, newest first, with their summary.
    pub fn financial_report(&self, doctor: DoctorId, period: &Period) -> Result<FinancialReport, ClinicError> {
        let filter = TransactionFilter {
            period: Some(*period),
            ..TransactionFilter::default()
        };
        let transactions = Ledger::new(self.db).list_transactions(doctor, &filter)?;
        FinancialReport::new(*period, transactions)
    }

    /// Visits in the period with patient names, oldest first.
    pub fn visit_report(&self, doctor: DoctorId, period: &Period) -> Result<VisitReport, ClinicError> {
        let patients = self.db.list_patients(doctor)?;
        let visits = self.db.list_visits_between(
            doctor,
            period.start_datetime(),
            period.end_datetime_exclusive(),
        )?;
        Ok(VisitReport::new(*period, &patients, visits))
    }

    pub fn export_csv(&self, doctor: DoctorId, kind: ReportKind, period: &Period) -> Result<String, ClinicError> {
        let csv = match kind {
            ReportKind::Financial => self.financial_report(doctor, period)?.to_csv(),
            ReportKind::Visits => self.visit_report(doctor, period)?.to_csv(),
        };
        info!(doctor = %doctor, kind = %kind, bytes = csv.len(), "Exported CSV report");
        Ok(csv)
    }

    pub fn export_json(&self, doctor: DoctorId, kind: ReportKind, period: &Period) -> Result<String, ClinicError> {
        let json = match kind {
            ReportKind::Financial => self.financial_report(doctor, period)?.to_json(),
            ReportKind::Visits => self.visit_report(doctor, period)?.to_json(),
        }?;
        info!(doctor = %doctor, kind = %kind, bytes = json.len(), "Exported JSON report");
        Ok(json)
    }

    pub fn export(
        &self,
        doctor: DoctorId,
        kind: ReportKind,
        period: &Period,
        format: ReportFormat,
    ) -> Result<String, ClinicError> {
        match format {
            ReportFormat::Csv => self.export_csv(doctor, kind, period),
            ReportFormat::Json => self.export_json(doctor, kind, period),
        }
    }
}

/// Escape a string for CSV output.
pub(crate) fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
