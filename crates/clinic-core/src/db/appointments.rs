//! Appointment database operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Appointment, AppointmentStatus, DoctorId, Priority};

const APPOINTMENT_COLUMNS: &str = r#"
    id, doctor_id, patient_local_id, scheduled_at, appointment_type, notes,
    duration_minutes, priority, status, created_at
"#;

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_local_id: row.get(2)?,
        scheduled_at: row.get(3)?,
        appointment_type: row.get(4)?,
        notes: row.get(5)?,
        duration_minutes: row.get(6)?,
        priority: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Column values for an appointment insert or full rewrite.
#[derive(Debug, Clone)]
pub struct AppointmentRow<'a> {
    pub scheduled_at: NaiveDateTime,
    pub appointment_type: &'a str,
    pub notes: Option<&'a str>,
    pub duration_minutes: u32,
    pub priority: Priority,
    pub status: AppointmentStatus,
}

impl Database {
    pub fn insert_appointment(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
        row: &AppointmentRow<'_>,
        now: NaiveDateTime,
    ) -> DbResult<Appointment> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                doctor_id, patient_local_id, scheduled_at, appointment_type, notes,
                duration_minutes, priority, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                doctor_id,
                patient_local_id,
                row.scheduled_at,
                row.appointment_type,
                row.notes,
                row.duration_minutes,
                row.priority,
                row.status,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_appointment(doctor_id, id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))
    }

    pub fn update_appointment_row(
        &self,
        doctor_id: DoctorId,
        appointment_id: i64,
        row: &AppointmentRow<'_>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                scheduled_at = ?3,
                appointment_type = ?4,
                notes = ?5,
                duration_minutes = ?6,
                priority = ?7,
                status = ?8
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![
                doctor_id,
                appointment_id,
                row.scheduled_at,
                row.appointment_type,
                row.notes,
                row.duration_minutes,
                row.priority,
                row.status,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_appointment(
        &self,
        doctor_id: DoctorId,
        appointment_id: i64,
    ) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM appointments WHERE doctor_id = ?1 AND id = ?2",
                    APPOINTMENT_COLUMNS
                ),
                params![doctor_id, appointment_id],
                appointment_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Appointments in `[from, to)` ordered by time, then id.
    pub fn list_appointments_between(
        &self,
        doctor_id: DoctorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE doctor_id = ?1 AND scheduled_at >= ?2 AND scheduled_at < ?3
            ORDER BY scheduled_at, id
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, from, to], appointment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All of a patient's appointments ordered by time.
    pub fn list_patient_appointments(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE doctor_id = ?1 AND patient_local_id = ?2
            ORDER BY scheduled_at, id
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, patient_local_id], appointment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// The next `limit` scheduled appointments at or after `now`.
    pub fn upcoming_appointments(
        &self,
        doctor_id: DoctorId,
        now: NaiveDateTime,
        limit: usize,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE doctor_id = ?1 AND status = 'scheduled' AND scheduled_at >= ?2
            ORDER BY scheduled_at, id
            LIMIT ?3
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, now, limit as i64], appointment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_appointments_between(
        &self,
        doctor_id: DoctorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM appointments
            WHERE doctor_id = ?1 AND scheduled_at >= ?2 AND scheduled_at < ?3
            "#,
            params![doctor_id, from, to],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_appointment_row(&self, doctor_id: DoctorId, appointment_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM appointments WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, appointment_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn delete_appointments_for_patient(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
    ) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM appointments WHERE doctor_id = ?1 AND patient_local_id = ?2",
            params![doctor_id, patient_local_id],
        )?;
        Ok(rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::models::NewPatient;

    fn setup_db() -> (Database, DoctorId) {
        let db = Database::open_in_memory().unwrap();
        let doctor = db.insert_doctor("house", "h", "", None, now()).unwrap().id;
        db.insert_patient(doctor, 1, &NewPatient::new("Max", "555"), now())
            .unwrap();
        (db, doctor)
    }

    fn at(hour: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn row(hour: u32) -> AppointmentRow<'static> {
        AppointmentRow {
            scheduled_at: at(hour),
            appointment_type: "checkup",
            notes: None,
            duration_minutes: 60,
            priority: Priority::Medium,
            status: AppointmentStatus::Scheduled,
        }
    }

    #[test]
    fn test_insert_and_list_ordered() {
        let (db, doctor) = setup_db();
        db.insert_appointment(doctor, 1, &row(14), now()).unwrap();
        db.insert_appointment(doctor, 1, &row(9), now()).unwrap();
        // overlapping slot is accepted
        db.insert_appointment(doctor, 1, &row(9), now()).unwrap();

        let listed = db.list_appointments_between(doctor, at(0), at(23)).unwrap();
        let hours: Vec<_> = listed.iter().map(|a| a.scheduled_at).collect();
        assert_eq!(hours, vec![at(9), at(9), at(14)]);
        assert!(listed[0].id < listed[1].id);
    }

    #[test]
    fn test_enum_columns_round_trip() {
        let (db, doctor) = setup_db();
        let mut r = row(10);
        r.priority = Priority::Urgent;
        r.status = AppointmentStatus::Incomplete;
        let created = db.insert_appointment(doctor, 1, &r, now()).unwrap();
        assert_eq!(created.priority, Priority::Urgent);
        assert_eq!(created.status, AppointmentStatus::Incomplete);
    }

    #[test]
    fn test_duration_bounds_enforced() {
        let (db, doctor) = setup_db();
        let mut r = row(10);
        r.duration_minutes = 0;
        assert!(db.insert_appointment(doctor, 1, &r, now()).is_err());
    }
}
