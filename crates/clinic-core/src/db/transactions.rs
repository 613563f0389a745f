//! Ledger transaction operations.

use chrono::NaiveDateTime;
use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{
    Direction, DoctorId, Money, NewTransaction, Reference, ReferenceKind, Transaction,
    TransactionFilter,
};

const TRANSACTION_COLUMNS: &str = r#"
    id, doctor_id, direction, category, subcategory, amount, description,
    transaction_date, payment_method, reference_kind, reference_id, notes,
    created_at, updated_at
"#;

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let reference_kind: Option<ReferenceKind> = row.get(9)?;
    let reference_id: Option<i64> = row.get(10)?;
    Ok(Transaction {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        direction: row.get(2)?,
        category: row.get(3)?,
        subcategory: row.get(4)?,
        amount: row.get(5)?,
        description: row.get(6)?,
        transaction_date: row.get(7)?,
        payment_method: row.get(8)?,
        reference: reference_kind.map(|kind| Reference {
            kind,
            id: reference_id,
        }),
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl Database {
    pub fn insert_transaction(
        &self,
        doctor_id: DoctorId,
        tx: &NewTransaction,
        now: NaiveDateTime,
    ) -> DbResult<Transaction> {
        self.conn.execute(
            r#"
            INSERT INTO transactions (
                doctor_id, direction, category, subcategory, amount, description,
                transaction_date, payment_method, reference_kind, reference_id, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
            params![
                doctor_id,
                tx.direction,
                tx.category,
                tx.subcategory,
                tx.amount,
                tx.description,
                tx.transaction_date,
                tx.payment_method,
                tx.reference.map(|r| r.kind),
                tx.reference.and_then(|r| r.id),
                tx.notes,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_transaction(doctor_id, id)?
            .ok_or_else(|| DbError::NotFound(format!("transaction {}", id)))
    }

    pub fn update_transaction_row(
        &self,
        doctor_id: DoctorId,
        transaction_id: i64,
        tx: &NewTransaction,
        now: NaiveDateTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE transactions SET
                direction = ?3,
                category = ?4,
                subcategory = ?5,
                amount = ?6,
                description = ?7,
                transaction_date = ?8,
                payment_method = ?9,
                reference_kind = ?10,
                reference_id = ?11,
                notes = ?12,
                updated_at = ?13
            WHERE doctor_id = ?1 AND id = ?2
            "#,
            params![
                doctor_id,
                transaction_id,
                tx.direction,
                tx.category,
                tx.subcategory,
                tx.amount,
                tx.description,
                tx.transaction_date,
                tx.payment_method,
                tx.reference.map(|r| r.kind),
                tx.reference.and_then(|r| r.id),
                tx.notes,
                now,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_transaction(
        &self,
        doctor_id: DoctorId,
        transaction_id: i64,
    ) -> DbResult<Option<Transaction>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE doctor_id = ?1 AND id = ?2",
                    TRANSACTION_COLUMNS
                ),
                params![doctor_id, transaction_id],
                transaction_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Transactions matching the filter, newest first.
    pub fn list_transactions(
        &self,
        doctor_id: DoctorId,
        filter: &TransactionFilter,
    ) -> DbResult<Vec<Transaction>> {
        let mut sql = format!(
            "SELECT {} FROM transactions WHERE doctor_id = ?",
            TRANSACTION_COLUMNS
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(doctor_id)];

        if let Some(period) = &filter.period {
            sql.push_str(" AND transaction_date >= ? AND transaction_date < ?");
            args.push(Box::new(period.start_datetime()));
            args.push(Box::new(period.end_datetime_exclusive()));
        }
        if let Some(direction) = filter.direction {
            sql.push_str(" AND direction = ?");
            args.push(Box::new(direction));
        }
        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            args.push(Box::new(category.clone()));
        }
        sql.push_str(" ORDER BY transaction_date DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            transaction_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Sum of one direction and category in `[from, to)`.
    pub fn sum_transactions(
        &self,
        doctor_id: DoctorId,
        direction: Direction,
        category: Option<&str>,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> DbResult<Money> {
        self.conn
            .query_row(
                r#"
                SELECT COALESCE(SUM(amount), 0) FROM transactions
                WHERE doctor_id = ?1 AND direction = ?2
                  AND (?3 IS NULL OR category = ?3)
                  AND transaction_date >= ?4 AND transaction_date < ?5
                "#,
                params![doctor_id, direction, category, from, to],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn category_in_use(
        &self,
        doctor_id: DoctorId,
        direction: Direction,
        category: &str,
    ) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE doctor_id = ?1 AND direction = ?2 AND category = ?3
            "#,
            params![doctor_id, direction, category],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Rename a category on every transaction that uses it.
    pub fn rename_transaction_category(
        &self,
        doctor_id: DoctorId,
        direction: Direction,
        from: &str,
        to: &str,
    ) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE transactions SET category = ?4
            WHERE doctor_id = ?1 AND direction = ?2 AND category = ?3
            "#,
            params![doctor_id, direction, from, to],
        )?;
        Ok(rows_affected)
    }

    pub fn delete_transaction_row(&self, doctor_id: DoctorId, transaction_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM transactions WHERE doctor_id = ?1 AND id = ?2",
            params![doctor_id, transaction_id],
        )?;
        Ok(rows_affected > 0)
    }
}
