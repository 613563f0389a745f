//! Doctor account and session operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Doctor, DoctorId};

/// A doctor row together with its password hash, for login checks only.
#[derive(Debug, Clone)]
pub struct DoctorCredentials {
    pub doctor: Doctor,
    pub password_hash: String,
}

const DOCTOR_COLUMNS: &str =
    "id, username, full_name, phone, is_active, created_at, last_login";

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        phone: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        last_login: row.get(6)?,
    })
}

impl Database {
    /// Insert a new doctor and return it.
    pub fn insert_doctor(
        &self,
        username: &str,
        password_hash: &str,
        full_name: &str,
        phone: Option<&str>,
        created_at: NaiveDateTime,
    ) -> DbResult<Doctor> {
        self.conn.execute(
            r#"
            INSERT INTO doctors (username, password_hash, full_name, phone, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![username, password_hash, full_name, phone, created_at],
        )?;
        let id = DoctorId(self.conn.last_insert_rowid());
        self.get_doctor(id)?
            .ok_or_else(|| DbError::NotFound(format!("doctor {}", id)))
    }

    /// Get a doctor by id.
    pub fn get_doctor(&self, id: DoctorId) -> DbResult<Option<Doctor>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM doctors WHERE id = ?", DOCTOR_COLUMNS),
                [id],
                doctor_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Look up login credentials by (normalized) username.
    pub fn find_credentials(&self, username: &str) -> DbResult<Option<DoctorCredentials>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {}, password_hash FROM doctors WHERE username = ?",
                    DOCTOR_COLUMNS
                ),
                [username],
                |row| {
                    Ok(DoctorCredentials {
                        doctor: doctor_from_row(row)?,
                        password_hash: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn username_exists(&self, username: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM doctors WHERE username = ?",
            [username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_password_hash(&self, id: DoctorId) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT password_hash FROM doctors WHERE id = ?",
                [id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set_password_hash(&self, id: DoctorId, password_hash: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctors SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn update_doctor_profile(
        &self,
        id: DoctorId,
        full_name: &str,
        phone: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctors SET full_name = ?2, phone = ?3 WHERE id = ?1",
            params![id, full_name, phone],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_doctor_active(&self, id: DoctorId, active: bool) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctors SET is_active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn record_login(&self, id: DoctorId, at: NaiveDateTime) -> DbResult<()> {
        self.conn.execute(
            "UPDATE doctors SET last_login = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        Ok(())
    }

    /// Hand out the doctor's next patient local id and advance the counter.
    ///
    /// The counter only ever moves forward, so ids are never reused even
    /// after patients are deleted.
    pub fn take_next_patient_local_id(&self, id: DoctorId) -> DbResult<i64> {
        self.conn
            .query_row(
                r#"
                UPDATE doctors SET next_patient_local_id = next_patient_local_id + 1
                WHERE id = ?
                RETURNING next_patient_local_id - 1
                "#,
                [id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("doctor {}", id)))
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn insert_session(
        &self,
        token_hash: &str,
        doctor_id: DoctorId,
        created_at: NaiveDateTime,
        expires_at: NaiveDateTime,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO sessions (token_hash, doctor_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![token_hash, doctor_id, created_at, expires_at],
        )?;
        Ok(())
    }

    /// Owner and expiry of a session, if it exists.
    pub fn get_session(&self, token_hash: &str) -> DbResult<Option<(DoctorId, NaiveDateTime)>> {
        self.conn
            .query_row(
                "SELECT doctor_id, expires_at FROM sessions WHERE token_hash = ?",
                [token_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn delete_session(&self, token_hash: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM sessions WHERE token_hash = ?", [token_hash])?;
        Ok(rows_affected > 0)
    }

    /// Revoke all of a doctor's sessions except `keep`.
    pub fn delete_other_sessions(&self, doctor_id: DoctorId, keep: Option<&str>) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM sessions WHERE doctor_id = ?1 AND token_hash IS NOT ?2",
            params![doctor_id, keep],
        )?;
        Ok(rows_affected)
    }

    pub fn delete_expired_sessions(&self, now: NaiveDateTime) -> DbResult<usize> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?", [now])?;
        Ok(rows_affected)
    }
}
