//! Custom ledger category operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Category, Direction, DoctorId};

const CATEGORY_COLUMNS: &str =
    "id, doctor_id, name, description, kind, color, is_active, created_at";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        kind: row.get(4)?,
        color: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl Database {
    pub fn insert_category(
        &self,
        doctor_id: DoctorId,
        name: &str,
        description: Option<&str>,
        kind: Direction,
        color: &str,
        now: NaiveDateTime,
    ) -> DbResult<Category> {
        self.conn.execute(
            r#"
            INSERT INTO categories (doctor_id, name, description, kind, color, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![doctor_id, name, description, kind, color, now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_category(doctor_id, id)?
            .ok_or_else(|| DbError::NotFound(format!("category {}", id)))
    }

    pub fn update_category_row(
        &self,
        doctor_id: DoctorId,
        category_id: i64,
        name: &str,
        description: Option<&str>,
        color: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE categories SET name = ?3, description = ?4, color = ?5
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![doctor_id, category_id, name, description, color],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_category_active(
        &self,
        doctor_id: DoctorId,
        category_id: i64,
        active: bool,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE categories SET is_active = ?3 WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, category_id, active],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_category(&self, doctor_id: DoctorId, category_id: i64) -> DbResult<Option<Category>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM categories WHERE doctor_id = ?1 AND id = ?2",
                    CATEGORY_COLUMNS
                ),
                params![doctor_id, category_id],
                category_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// A doctor's custom categories, optionally of one kind, by name.
    pub fn list_categories(
        &self,
        doctor_id: DoctorId,
        kind: Option<Direction>,
    ) -> DbResult<Vec<Category>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM categories
            WHERE doctor_id = ?1 AND (?2 IS NULL OR kind = ?2)
            ORDER BY kind, name
            "#,
            CATEGORY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![doctor_id, kind], category_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// True if an active custom category of this kind has the given name.
    pub fn active_category_exists(
        &self,
        doctor_id: DoctorId,
        kind: Direction,
        name: &str,
    ) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM categories
            WHERE doctor_id = ?1 AND kind = ?2 AND name = ?3 AND is_active = 1
            "#,
            params![doctor_id, kind, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn delete_category_row(&self, doctor_id: DoctorId, category_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM categories WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, category_id],
        )?;
        Ok(rows_affected > 0)
    }
}
