//! Patient models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{DoctorId, Money};

/// A patient record, owned by exactly one doctor.
///
/// Identified by the composite key `(doctor_id, local_id)`. `local_id` is
/// only unique within the owning doctor's patients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub doctor_id: DoctorId,
    /// Doctor-scoped sequential id, starting at 1, never reused
    pub local_id: i64,
    pub name: String,
    pub phone: String,
    pub age: Option<u32>,
    /// Initial diagnosis
    pub diagnosis: Option<String>,
    pub medicines: Option<String>,
    /// Date of the earliest recorded visit
    pub first_visit: Option<NaiveDateTime>,
    /// Earliest upcoming scheduled appointment
    pub next_visit: Option<NaiveDateTime>,
    /// Treatment finished
    pub completed: bool,
    /// Opening balance outside of visits
    pub amount_due: Money,
    pub amount_paid: Money,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Registration form input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medicines: Option<String>,
    #[serde(default)]
    pub amount_due: Money,
    #[serde(default)]
    pub amount_paid: Money,
}

impl NewPatient {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }
}

/// Edit form input; replaces every editable field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientUpdate {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medicines: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl From<&Patient> for PatientUpdate {
    fn from(patient: &Patient) -> Self {
        Self {
            name: patient.name.clone(),
            phone: patient.phone.clone(),
            age: patient.age,
            diagnosis: patient.diagnosis.clone(),
            medicines: patient.medicines.clone(),
            completed: patient.completed,
        }
    }
}

/// Outstanding balance across the opening balance and all visits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatientBalance {
    pub total_due: Money,
    pub total_paid: Money,
    pub unpaid: Money,
}

impl PatientBalance {
    pub fn new(total_due: Money, total_paid: Money) -> Self {
        Self {
            total_due,
            total_paid,
            unpaid: total_due - total_paid,
        }
    }
}

/// What an explicit patient delete removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletedPatient {
    pub local_id: i64,
    pub visits_removed: usize,
    pub appointments_removed: usize,
    pub xrays_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_unpaid() {
        let balance = PatientBalance::new(Money::from_major(300), Money::from_major(120));
        assert_eq!(balance.unpaid, Money::from_major(180));
    }

    #[test]
    fn test_new_patient_deserializes_with_defaults() {
        let input: NewPatient =
            serde_json::from_str(r#"{"name": "Max", "phone": "555-0100"}"#).unwrap();
        assert_eq!(input.name, "Max");
        assert_eq!(input.age, None);
        assert_eq!(input.amount_due, Money::ZERO);
    }
}
