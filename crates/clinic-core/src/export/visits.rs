//! Visit report: one row per visit with the patient's name.

use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::escape_csv;
use crate::models::{Money, Patient, Period, Visit};

const HEADER: &str =
    "Visit Date,Patient ID,Patient Name,Diagnosis,Medications,Amount Due,Amount Paid,X-rays";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitReportRow {
    pub visit_id: i64,
    pub visit_date: NaiveDateTime,
    pub patient_local_id: i64,
    pub patient_name: String,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub amount_due: Money,
    pub amount_paid: Money,
    pub xray_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitReport {
    pub period: Period,
    pub rows: Vec<VisitReportRow>,
    pub total_due: Money,
    pub total_paid: Money,
}

impl VisitReport {
    pub fn new(period: Period, patients: &[Patient], visits: Vec<Visit>) -> Self {
        let names: HashMap<i64, &str> = patients
            .iter()
            .map(|p| (p.local_id, p.name.as_str()))
            .collect();

        let rows: Vec<VisitReportRow> = visits
            .into_iter()
            .map(|v| VisitReportRow {
                visit_id: v.id,
                visit_date: v.visit_date,
                patient_local_id: v.patient_local_id,
                patient_name: names
                    .get(&v.patient_local_id)
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                diagnosis: v.diagnosis,
                medications: v.medications,
                amount_due: v.amount_due,
                amount_paid: v.amount_paid,
                xray_count: v.xrays.len(),
            })
            .collect();

        Self {
            period,
            total_due: rows.iter().map(|r| r.amount_due).sum(),
            total_paid: rows.iter().map(|r| r.amount_paid).sum(),
            rows,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::new();
        csv.push_str(HEADER);
        csv.push('\n');

        for row in &self.rows {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{}",
                row.visit_date.format("%Y-%m-%d %H:%M:%S"),
                row.patient_local_id,
                escape_csv(&row.patient_name),
                escape_csv(row.diagnosis.as_deref().unwrap_or("")),
                escape_csv(row.medications.as_deref().unwrap_or("")),
                row.amount_due,
                row.amount_paid,
                row.xray_count,
            );
        }
        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::models::{DoctorId, NewPatient};
    use chrono::NaiveDate;

    fn patient(local_id: i64, name: &str) -> Patient {
        let input = NewPatient::new(name, "1");
        Patient {
            doctor_id: DoctorId(1),
            local_id,
            name: input.name,
            phone: input.phone,
            age: None,
            diagnosis: None,
            medicines: None,
            first_visit: None,
            next_visit: None,
            completed: false,
            amount_due: Money::ZERO,
            amount_paid: Money::ZERO,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn visit(id: i64, local_id: i64, diagnosis: &str) -> Visit {
        Visit {
            id,
            doctor_id: DoctorId(1),
            patient_local_id: local_id,
            visit_date: NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            diagnosis: Some(diagnosis.to_string()),
            medications: None,
            amount_due: Money::from_major(40),
            amount_paid: Money::from_major(15),
            xrays: Vec::new(),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_csv_rows() {
        let period = Period::day(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        let report = VisitReport::new(
            period,
            &[patient(1, "Ann"), patient(2, "Ben")],
            vec![visit(10, 2, "Cough, mild"), visit(11, 1, "Checkup")],
        );
        let csv = report.to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "2024-05-02 08:00:00,2,Ben,\"Cough, mild\",,40.00,15.00,0");
        assert_eq!(lines[2], "2024-05-02 08:00:00,1,Ann,Checkup,,40.00,15.00,0");
        assert_eq!(report.total_due, Money::from_major(80));
        assert_eq!(report.total_paid, Money::from_major(30));
    }
}
