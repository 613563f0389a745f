//! Visit log and X-ray attachment models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{de_datetime, DoctorId, Money};

/// A medical visit for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Visit {
    pub id: i64,
    pub doctor_id: DoctorId,
    pub patient_local_id: i64,
    pub visit_date: NaiveDateTime,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub amount_due: Money,
    pub amount_paid: Money,
    /// Attached X-ray images, oldest first
    pub xrays: Vec<XrayFile>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Visit form input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVisit {
    #[serde(deserialize_with = "de_datetime")]
    pub visit_date: NaiveDateTime,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub amount_due: Money,
    #[serde(default)]
    pub amount_paid: Money,
}

impl NewVisit {
    pub fn on(visit_date: NaiveDateTime) -> Self {
        Self {
            visit_date,
            diagnosis: None,
            medications: None,
            amount_due: Money::ZERO,
            amount_paid: Money::ZERO,
        }
    }
}

/// Edit form input; replaces the visit's fields and optionally drops
/// attached X-rays by id.
#[derive(Debug, Clone, Deserialize)]
pub struct VisitUpdate {
    #[serde(deserialize_with = "de_datetime")]
    pub visit_date: NaiveDateTime,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub amount_due: Money,
    #[serde(default)]
    pub amount_paid: Money,
    #[serde(default)]
    pub remove_xrays: Vec<i64>,
}

impl From<&Visit> for VisitUpdate {
    fn from(visit: &Visit) -> Self {
        Self {
            visit_date: visit.visit_date,
            diagnosis: visit.diagnosis.clone(),
            medications: visit.medications.clone(),
            amount_due: visit.amount_due,
            amount_paid: visit.amount_paid,
            remove_xrays: Vec::new(),
        }
    }
}

/// Metadata for a stored X-ray image; the bytes live on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XrayFile {
    pub id: i64,
    pub visit_id: i64,
    pub doctor_id: DoctorId,
    /// Client-supplied name, for display only
    pub original_name: String,
    /// Sanitized path relative to the upload root
    pub stored_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    pub uploaded_at: NaiveDateTime,
}
