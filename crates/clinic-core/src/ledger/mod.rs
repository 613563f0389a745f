//! Financial ledger: income and expense transactions, custom categories,
//! monthly budgets and the dashboard overview.

mod budgets;
mod categories;
mod dashboard;
mod summary;

pub use summary::summarize_transactions;

use tracing::{debug, info};

use crate::db::{self, Database};
use crate::models::{
    Direction, DoctorId, NewTransaction, Period, Summary, Transaction, TransactionFilter,
    PATIENT_REFUND_CATEGORY,
};
use crate::validation;
use crate::ClinicError;

fn not_found(transaction_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("transaction {}", transaction_id))
}

/// Ledger operations, always scoped to one doctor.
pub struct Ledger<'a> {
    db: &'a Database,
}

impl<'a> Ledger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn record_transaction(
        &self,
        doctor: DoctorId,
        input: &NewTransaction,
    ) -> Result<Transaction, ClinicError> {
        let input = self.clean_transaction(doctor, input, None)?;
        let transaction = self.db.insert_transaction(doctor, &input, db::now())?;
        info!(
            doctor = %doctor,
            transaction_id = transaction.id,
            direction = %transaction.direction,
            amount = %transaction.amount,
            "Recorded transaction"
        );
        Ok(transaction)
    }

    pub fn get_transaction(&self, doctor: DoctorId, transaction_id: i64) -> Result<Transaction, ClinicError> {
        self.db
            .get_transaction(doctor, transaction_id)?
            .ok_or_else(|| not_found(transaction_id))
    }

    /// Replace every field of a transaction. A category that has since been
    /// deactivated may be kept but not newly chosen.
    pub fn update_transaction(
        &self,
        doctor: DoctorId,
        transaction_id: i64,
        input: &NewTransaction,
    ) -> Result<Transaction, ClinicError> {
        let tx = self.db.begin()?;
        let existing = self.get_transaction(doctor, transaction_id)?;
        let input = self.clean_transaction(doctor, input, Some(&existing))?;
        self.db
            .update_transaction_row(doctor, transaction_id, &input, db::now())?;
        let transaction = self.get_transaction(doctor, transaction_id)?;
        tx.commit()?;

        info!(doctor = %doctor, transaction_id, "Updated transaction");
        Ok(transaction)
    }

    pub fn delete_transaction(&self, doctor: DoctorId, transaction_id: i64) -> Result<(), ClinicError> {
        if !self.db.delete_transaction_row(doctor, transaction_id)? {
            return Err(not_found(transaction_id));
        }
        info!(doctor = %doctor, transaction_id, "Deleted transaction");
        Ok(())
    }

    /// Matching transactions, newest first.
    pub fn list_transactions(
        &self,
        doctor: DoctorId,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ClinicError> {
        Ok(self.db.list_transactions(doctor, filter)?)
    }

    /// Totals and per-category sums over the period.
    pub fn summarize(&self, doctor: DoctorId, period: &Period) -> Result<Summary, ClinicError> {
        let filter = TransactionFilter {
            period: Some(*period),
            ..TransactionFilter::default()
        };
        let transactions = self.db.list_transactions(doctor, &filter)?;
        debug!(doctor = %doctor, count = transactions.len(), "Summarizing transactions");
        summarize_transactions(&transactions)
    }

    fn clean_transaction(
        &self,
        doctor: DoctorId,
        input: &NewTransaction,
        existing: Option<&Transaction>,
    ) -> Result<NewTransaction, ClinicError> {
        let category = validation::required_max(
            "category",
            &input.category,
            validation::MAX_CATEGORY_NAME_LEN,
        )?;
        let unchanged = existing
            .map(|t| t.direction == input.direction && t.category == category)
            .unwrap_or(false);
        if !unchanged && !self.category_allowed(doctor, input.direction, &category)? {
            return Err(ClinicError::validation(
                "category",
                format!("unknown {} category: {}", input.direction, category),
            ));
        }

        Ok(NewTransaction {
            direction: input.direction,
            category,
            subcategory: validation::optional(input.subcategory.as_deref()),
            amount: validation::positive("amount", input.amount)?,
            description: validation::optional(input.description.as_deref()),
            transaction_date: input.transaction_date,
            payment_method: input.payment_method,
            reference: input.reference,
            notes: validation::optional(input.notes.as_deref()),
        })
    }

    /// Defaults, the refund category for expenses, or an active custom
    /// category of the same kind.
    fn category_allowed(
        &self,
        doctor: DoctorId,
        direction: Direction,
        category: &str,
    ) -> Result<bool, ClinicError> {
        if direction.default_categories().contains(&category) {
            return Ok(true);
        }
        if direction == Direction::Expense && category == PATIENT_REFUND_CATEGORY {
            return Ok(true);
        }
        Ok(self.db.active_category_exists(doctor, direction, category)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Money, NewCategory};
    use chrono::{NaiveDate, NaiveDateTime};

    pub(super) fn setup() -> (Database, DoctorId) {
        let db = Database::open_in_memory().unwrap();
        let doctor = db.insert_doctor("house", "h", "", None, db::now()).unwrap().id;
        (db, doctor)
    }

    pub(super) fn on(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_record_and_get() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);

        let mut input = NewTransaction::new(
            Direction::Expense,
            " Rent ",
            Money::from_major(900),
            on(2024, 5, 1),
        );
        input.description = Some("  ".into());
        let recorded = ledger.record_transaction(doctor, &input).unwrap();
        assert_eq!(recorded.category, "Rent");
        assert_eq!(recorded.description, None);
        assert_eq!(ledger.get_transaction(doctor, recorded.id).unwrap(), recorded);
    }

    #[test]
    fn test_rejects_bad_input() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);

        let zero = NewTransaction::new(Direction::Income, "Consultation", Money::ZERO, on(2024, 5, 1));
        assert!(matches!(
            ledger.record_transaction(doctor, &zero),
            Err(ClinicError::Validation { ref field, .. }) if field == "amount"
        ));

        // "Rent" is an expense category only
        let wrong_kind = NewTransaction::new(Direction::Income, "Rent", Money::from_major(1), on(2024, 5, 1));
        assert!(matches!(
            ledger.record_transaction(doctor, &wrong_kind),
            Err(ClinicError::Validation { ref field, .. }) if field == "category"
        ));
    }

    #[test]
    fn test_custom_category_becomes_usable() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        let input = NewTransaction::new(Direction::Expense, "Lab Fees", Money::from_major(5), on(2024, 5, 1));
        assert!(ledger.record_transaction(doctor, &input).is_err());

        let category = ledger
            .create_category(
                doctor,
                &NewCategory {
                    name: "Lab Fees".into(),
                    description: None,
                    kind: Direction::Expense,
                    color: None,
                },
            )
            .unwrap();
        let recorded = ledger.record_transaction(doctor, &input).unwrap();

        // deactivated categories stay on existing entries
        ledger.set_category_active(doctor, category.id, false).unwrap();
        assert!(ledger.record_transaction(doctor, &input).is_err());
        let mut edit = input.clone();
        edit.amount = Money::from_major(6);
        assert!(ledger.update_transaction(doctor, recorded.id, &edit).is_ok());
    }

    #[test]
    fn test_other_doctor_cannot_touch_transaction() {
        let (db, doctor) = setup();
        let other = db.insert_doctor("wilson", "h", "", None, db::now()).unwrap().id;
        let ledger = Ledger::new(&db);
        let input = NewTransaction::new(Direction::Income, "Consultation", Money::from_major(1), on(2024, 5, 1));
        let recorded = ledger.record_transaction(doctor, &input).unwrap();

        assert!(matches!(ledger.get_transaction(other, recorded.id), Err(ClinicError::NotFound(_))));
        assert!(matches!(
            ledger.update_transaction(other, recorded.id, &input),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(ledger.delete_transaction(other, recorded.id), Err(ClinicError::NotFound(_))));
        assert!(ledger
            .list_transactions(other, &TransactionFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_summarize_period() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        for (direction, category, major, date) in [
            (Direction::Income, "Consultation", 100, on(2024, 5, 1)),
            (Direction::Income, "Procedure", 200, on(2024, 5, 15)),
            (Direction::Expense, "Rent", 30, on(2024, 5, 31)),
            (Direction::Income, "Consultation", 999, on(2024, 6, 1)),
        ] {
            let input = NewTransaction::new(direction, category, Money::from_major(major), date);
            ledger.record_transaction(doctor, &input).unwrap();
        }

        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap();
        let summary = ledger.summarize(doctor, &period).unwrap();
        assert_eq!(summary.total_income, Money::from_major(300));
        assert_eq!(summary.total_expense, Money::from_major(30));
        assert_eq!(summary.net, Money::from_major(270));
        assert_eq!(summary.transaction_count, 3);
    }
}
