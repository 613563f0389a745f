//! Monthly budget operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Budget, DoctorId, Money, YearMonth};

const BUDGET_COLUMNS: &str = r#"
    id, doctor_id, category, year, month, monthly_limit, alert_threshold,
    is_active, created_at
"#;

fn budget_from_row(row: &Row<'_>) -> rusqlite::Result<Budget> {
    Ok(Budget {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        category: row.get(2)?,
        year: row.get(3)?,
        month: row.get(4)?,
        monthly_limit: row.get(5)?,
        alert_threshold: row.get(6)?,
        is_active: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl Database {
    pub fn insert_budget(
        &self,
        doctor_id: DoctorId,
        category: &str,
        month: YearMonth,
        monthly_limit: Money,
        alert_threshold: u8,
        now: NaiveDateTime,
    ) -> DbResult<Budget> {
        self.conn.execute(
            r#"
            INSERT INTO budgets (
                doctor_id, category, year, month, monthly_limit, alert_threshold, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                doctor_id,
                category,
                month.year,
                month.month,
                monthly_limit,
                alert_threshold,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_budget(doctor_id, id)?
            .ok_or_else(|| DbError::NotFound(format!("budget {}", id)))
    }

    pub fn update_budget_row(
        &self,
        doctor_id: DoctorId,
        budget_id: i64,
        monthly_limit: Money,
        alert_threshold: u8,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE budgets SET monthly_limit = ?3, alert_threshold = ?4
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![doctor_id, budget_id, monthly_limit, alert_threshold],
        )?;
        Ok(rows_affected > 0)
    }

    /// Toggle a budget; activating fails with a unique violation if another
    /// active budget covers the same category and month.
    pub fn set_budget_active(&self, doctor_id: DoctorId, budget_id: i64, active: bool) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE budgets SET is_active = ?3 WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, budget_id, active],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_budget(&self, doctor_id: DoctorId, budget_id: i64) -> DbResult<Option<Budget>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM budgets WHERE doctor_id = ?1 AND id = ?2",
                    BUDGET_COLUMNS
                ),
                params![doctor_id, budget_id],
                budget_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// The active budget for a category and month.
    pub fn find_active_budget(
        &self,
        doctor_id: DoctorId,
        category: &str,
        month: YearMonth,
    ) -> DbResult<Option<Budget>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT {} FROM budgets
                    WHERE doctor_id = ?1 AND category = ?2 AND year = ?3 AND month = ?4
                      AND is_active = 1
                    "#,
                    BUDGET_COLUMNS
                ),
                params![doctor_id, category, month.year, month.month],
                budget_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// A doctor's budgets, newest month first, optionally for one month.
    pub fn list_budgets(&self, doctor_id: DoctorId, month: Option<YearMonth>) -> DbResult<Vec<Budget>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM budgets
            WHERE doctor_id = ?1 AND (?2 IS NULL OR (year = ?2 AND month = ?3))
            ORDER BY year DESC, month DESC, category
            "#,
            BUDGET_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![doctor_id, month.map(|m| m.year), month.map(|m| m.month)],
            budget_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Point every budget of a renamed category at its new name.
    pub fn rename_budget_category(&self, doctor_id: DoctorId, from: &str, to: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE budgets SET category = ?3 WHERE doctor_id = ?1 AND category = ?2",
            params![doctor_id, from, to],
        )?;
        Ok(rows_affected)
    }

    pub fn delete_budget_row(&self, doctor_id: DoctorId, budget_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM budgets WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, budget_id],
        )?;
        Ok(rows_affected > 0)
    }
}
