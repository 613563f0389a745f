//! Visit and X-ray metadata operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{DoctorId, NewVisit, Visit, VisitUpdate, XrayFile};
use crate::storage::StoredFile;

const VISIT_COLUMNS: &str = r#"
    id, doctor_id, patient_local_id, visit_date, diagnosis, medications,
    amount_due, amount_paid, created_at, updated_at
"#;

const XRAY_COLUMNS: &str = r#"
    id, visit_id, doctor_id, original_name, stored_path, content_type,
    size_bytes, sha256, uploaded_at
"#;

fn visit_from_row(row: &Row<'_>) -> rusqlite::Result<Visit> {
    Ok(Visit {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_local_id: row.get(2)?,
        visit_date: row.get(3)?,
        diagnosis: row.get(4)?,
        medications: row.get(5)?,
        amount_due: row.get(6)?,
        amount_paid: row.get(7)?,
        xrays: Vec::new(),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn xray_from_row(row: &Row<'_>) -> rusqlite::Result<XrayFile> {
    Ok(XrayFile {
        id: row.get(0)?,
        visit_id: row.get(1)?,
        doctor_id: row.get(2)?,
        original_name: row.get(3)?,
        stored_path: row.get(4)?,
        content_type: row.get(5)?,
        size_bytes: row.get(6)?,
        sha256: row.get(7)?,
        uploaded_at: row.get(8)?,
    })
}

impl Database {
    /// Insert a visit for a patient and return its id.
    pub fn insert_visit(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
        visit: &NewVisit,
        now: NaiveDateTime,
    ) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO visits (
                doctor_id, patient_local_id, visit_date, diagnosis, medications,
                amount_due, amount_paid, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                doctor_id,
                patient_local_id,
                visit.visit_date,
                visit.diagnosis,
                visit.medications,
                visit.amount_due,
                visit.amount_paid,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_visit_row(
        &self,
        doctor_id: DoctorId,
        visit_id: i64,
        update: &VisitUpdate,
        now: NaiveDateTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE visits SET
                visit_date = ?3,
                diagnosis = ?4,
                medications = ?5,
                amount_due = ?6,
                amount_paid = ?7,
                updated_at = ?8
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![
                doctor_id,
                visit_id,
                update.visit_date,
                update.diagnosis,
                update.medications,
                update.amount_due,
                update.amount_paid,
                now,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a visit with its X-rays.
    pub fn get_visit(&self, doctor_id: DoctorId, visit_id: i64) -> DbResult<Option<Visit>> {
        let visit = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM visits WHERE doctor_id = ?1 AND id = ?2",
                    VISIT_COLUMNS
                ),
                params![doctor_id, visit_id],
                visit_from_row,
            )
            .optional()?;

        match visit {
            Some(mut visit) => {
                visit.xrays = self.list_xrays(doctor_id, visit.id)?;
                Ok(Some(visit))
            }
            None => Ok(None),
        }
    }

    /// A patient's visits, newest first, with X-rays.
    pub fn list_visits(&self, doctor_id: DoctorId, patient_local_id: i64) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM visits
            WHERE doctor_id = ?1 AND patient_local_id = ?2
            ORDER BY visit_date DESC, id DESC
            "#,
            VISIT_COLUMNS
        ))?;
        let visits = stmt
            .query_map(params![doctor_id, patient_local_id], visit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_xrays(doctor_id, visits)
    }

    /// All visits in `[from, to)`, oldest first, with X-rays.
    pub fn list_visits_between(
        &self,
        doctor_id: DoctorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<Vec<Visit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM visits
            WHERE doctor_id = ?1 AND visit_date >= ?2 AND visit_date < ?3
            ORDER BY visit_date, id
            "#,
            VISIT_COLUMNS
        ))?;
        let visits = stmt
            .query_map(params![doctor_id, from, to], visit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_xrays(doctor_id, visits)
    }

    pub fn count_visits_between(
        &self,
        doctor_id: DoctorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM visits
            WHERE doctor_id = ?1 AND visit_date >= ?2 AND visit_date < ?3
            "#,
            params![doctor_id, from, to],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn attach_xrays(&self, doctor_id: DoctorId, mut visits: Vec<Visit>) -> DbResult<Vec<Visit>> {
        for visit in &mut visits {
            visit.xrays = self.list_xrays(doctor_id, visit.id)?;
        }
        Ok(visits)
    }

    pub fn delete_visit_row(&self, doctor_id: DoctorId, visit_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM visits WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, visit_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn delete_visits_for_patient(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
    ) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM visits WHERE doctor_id = ?1 AND patient_local_id = ?2",
            params![doctor_id, patient_local_id],
        )?;
        Ok(rows_affected)
    }

    // =========================================================================
    // X-ray metadata
    // =========================================================================

    pub fn insert_xray(
        &self,
        doctor_id: DoctorId,
        visit_id: i64,
        file: &StoredFile,
        now: NaiveDateTime,
    ) -> DbResult<XrayFile> {
        self.conn.execute(
            r#"
            INSERT INTO xray_files (
                visit_id, doctor_id, original_name, stored_path, content_type,
                size_bytes, sha256, uploaded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                visit_id,
                doctor_id,
                file.original_name,
                file.stored_path,
                file.content_type,
                file.size_bytes,
                file.sha256,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_xray(doctor_id, id)?
            .ok_or_else(|| DbError::NotFound(format!("x-ray {}", id)))
    }

    pub fn get_xray(&self, doctor_id: DoctorId, xray_id: i64) -> DbResult<Option<XrayFile>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM xray_files WHERE doctor_id = ?1 AND id = ?2",
                    XRAY_COLUMNS
                ),
                params![doctor_id, xray_id],
                xray_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_xrays(&self, doctor_id: DoctorId, visit_id: i64) -> DbResult<Vec<XrayFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM xray_files WHERE doctor_id = ?1 AND visit_id = ?2 ORDER BY id",
            XRAY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, visit_id], xray_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// X-rays attached to any of a patient's visits.
    pub fn list_xrays_for_patient(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
    ) -> DbResult<Vec<XrayFile>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT x.id, x.visit_id, x.doctor_id, x.original_name, x.stored_path,
                   x.content_type, x.size_bytes, x.sha256, x.uploaded_at
            FROM xray_files x
            JOIN visits v ON v.id = x.visit_id
            WHERE x.doctor_id = ?1 AND v.doctor_id = ?1 AND v.patient_local_id = ?2
            ORDER BY x.id
            "#,
        )?;
        let rows = stmt.query_map(params![doctor_id, patient_local_id], xray_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_xray_row(&self, doctor_id: DoctorId, xray_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM xray_files WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, xray_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn delete_xrays_for_visit(&self, doctor_id: DoctorId, visit_id: i64) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM xray_files WHERE doctor_id = ?1 AND visit_id = ?2",
            params![doctor_id, visit_id],
        )?;
        Ok(rows_affected)
    }

    pub fn delete_xrays_for_patient(
        &self,
        doctor_id: DoctorId,
        patient_local_id: i64,
    ) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            r#"
            DELETE FROM xray_files
            WHERE doctor_id = ?1 AND visit_id IN (
                SELECT id FROM visits WHERE doctor_id = ?1 AND patient_local_id = ?2
            )
            "#,
            params![doctor_id, patient_local_id],
        )?;
        Ok(rows_affected)
    }
}
