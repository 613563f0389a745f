//! Patient database operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{DoctorId, Money, NewPatient, Patient, PatientUpdate};

const PATIENT_COLUMNS: &str = r#"
    doctor_id, local_id, name, phone, age, diagnosis, medicines,
    first_visit, next_visit, completed, amount_due, amount_paid,
    created_at, updated_at
"#;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        doctor_id: row.get(0)?,
        local_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        age: row.get(4)?,
        diagnosis: row.get(5)?,
        medicines: row.get(6)?,
        first_visit: row.get(7)?,
        next_visit: row.get(8)?,
        completed: row.get(9)?,
        amount_due: row.get(10)?,
        amount_paid: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl Database {
    /// Insert a new patient under an already-allocated local id.
    pub fn insert_patient(
        &self,
        doctor_id: DoctorId,
        local_id: i64,
        patient: &NewPatient,
        now: NaiveDateTime,
    ) -> DbResult<Patient> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                doctor_id, local_id, name, phone, age, diagnosis, medicines,
                amount_due, amount_paid, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
            params![
                doctor_id,
                local_id,
                patient.name,
                patient.phone,
                patient.age,
                patient.diagnosis,
                patient.medicines,
                patient.amount_due,
                patient.amount_paid,
                now,
            ],
        )?;
        self.get_patient(doctor_id, local_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", local_id)))
    }

    /// Update the editable fields of a patient.
    pub fn update_patient(
        &self,
        doctor_id: DoctorId,
        local_id: i64,
        update: &PatientUpdate,
        now: NaiveDateTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?3,
                phone = ?4,
                age = ?5,
                diagnosis = ?6,
                medicines = ?7,
                completed = ?8,
                updated_at = ?9
            WHERE doctor_id = ?1 AND local_id = ?2
            "#,
            params![
                doctor_id,
                local_id,
                update.name,
                update.phone,
                update.age,
                update.diagnosis,
                update.medicines,
                update.completed,
                now,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by its doctor-scoped id.
    pub fn get_patient(&self, doctor_id: DoctorId, local_id: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM patients WHERE doctor_id = ?1 AND local_id = ?2",
                    PATIENT_COLUMNS
                ),
                params![doctor_id, local_id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn patient_exists(&self, doctor_id: DoctorId, local_id: i64) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE doctor_id = ?1 AND local_id = ?2",
            params![doctor_id, local_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List a doctor's patients by local id.
    pub fn list_patients(&self, doctor_id: DoctorId) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients WHERE doctor_id = ? ORDER BY local_id",
            PATIENT_COLUMNS
        ))?;
        let rows = stmt.query_map([doctor_id], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Case-insensitive substring search on name and phone; a numeric
    /// query also matches the local id exactly.
    pub fn search_patients(&self, doctor_id: DoctorId, query: &str) -> DbResult<Vec<Patient>> {
        let query = query.trim();
        let pattern = like_pattern(query);
        let id_match: Option<i64> = query.parse().ok();

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM patients
            WHERE doctor_id = ?1
              AND (name LIKE ?2 ESCAPE '\' OR phone LIKE ?2 ESCAPE '\' OR local_id = ?3)
            ORDER BY local_id
            "#,
            PATIENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, pattern, id_match], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Recompute `first_visit` as the earliest remaining visit.
    pub fn refresh_first_visit(&self, doctor_id: DoctorId, local_id: i64) -> DbResult<()> {
        self.conn.execute(
            r#"
            UPDATE patients SET first_visit = (
                SELECT MIN(visit_date) FROM visits
                WHERE doctor_id = ?1 AND patient_local_id = ?2
            )
            WHERE doctor_id = ?1 AND local_id = ?2
            "#,
            params![doctor_id, local_id],
        )?;
        Ok(())
    }

    /// Recompute `next_visit` as the earliest scheduled appointment at or
    /// after `now`.
    pub fn refresh_next_visit(
        &self,
        doctor_id: DoctorId,
        local_id: i64,
        now: NaiveDateTime,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            UPDATE patients SET next_visit = (
                SELECT MIN(scheduled_at) FROM appointments
                WHERE doctor_id = ?1 AND patient_local_id = ?2
                  AND status = 'scheduled' AND scheduled_at >= ?3
            )
            WHERE doctor_id = ?1 AND local_id = ?2
            "#,
            params![doctor_id, local_id, now],
        )?;
        Ok(())
    }

    /// Delete the patient row only; dependents must already be gone.
    pub fn delete_patient_row(&self, doctor_id: DoctorId, local_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM patients WHERE doctor_id = ?1 AND local_id = ?2",
            params![doctor_id, local_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Due and paid totals over the opening balance and all visits.
    pub fn patient_totals(&self, doctor_id: DoctorId, local_id: i64) -> DbResult<(Money, Money)> {
        self.conn
            .query_row(
                r#"
                SELECT
                    p.amount_due + COALESCE(
                        (SELECT SUM(amount_due) FROM visits
                         WHERE doctor_id = p.doctor_id AND patient_local_id = p.local_id), 0),
                    p.amount_paid + COALESCE(
                        (SELECT SUM(amount_paid) FROM visits
                         WHERE doctor_id = p.doctor_id AND patient_local_id = p.local_id), 0)
                FROM patients p
                WHERE p.doctor_id = ?1 AND p.local_id = ?2
                "#,
                params![doctor_id, local_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("patient {}", local_id)))
    }

    /// Sum of positive unpaid balances over all of a doctor's patients.
    pub fn outstanding_balance(&self, doctor_id: DoctorId) -> DbResult<Money> {
        self.conn
            .query_row(
                r#"
                SELECT COALESCE(SUM(CASE WHEN unpaid > 0 THEN unpaid ELSE 0 END), 0)
                FROM (
                    SELECT p.amount_due - p.amount_paid + COALESCE(
                        (SELECT SUM(amount_due - amount_paid) FROM visits
                         WHERE doctor_id = p.doctor_id AND patient_local_id = p.local_id), 0
                    ) AS unpaid
                    FROM patients p
                    WHERE p.doctor_id = ?
                )
                "#,
                [doctor_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Total and completed patient counts.
    pub fn count_patients(&self, doctor_id: DoctorId) -> DbResult<(usize, usize)> {
        let (total, completed): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(completed), 0)
            FROM patients WHERE doctor_id = ?
            "#,
            [doctor_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as usize, completed as usize))
    }

    /// Patients whose first visit falls in `[from, to)`.
    pub fn count_new_patients(
        &self,
        doctor_id: DoctorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM patients
            WHERE doctor_id = ?1 AND first_visit >= ?2 AND first_visit < ?3
            "#,
            params![doctor_id, from, to],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Patients with a visit or appointment at or after `since`.
    pub fn count_active_patients(&self, doctor_id: DoctorId, since: NaiveDateTime) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM (
                SELECT patient_local_id FROM visits
                WHERE doctor_id = ?1 AND visit_date >= ?2
                UNION
                SELECT patient_local_id FROM appointments
                WHERE doctor_id = ?1 AND scheduled_at >= ?2
            )
            "#,
            params![doctor_id, since],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
