//! Monthly expense budgets.

use tracing::{debug, info};

use super::Ledger;
use crate::db::{self, DbError};
use crate::models::{
    Budget, BudgetStatus, BudgetUpdate, Direction, DoctorId, Money, NewBudget, Period, YearMonth,
    DEFAULT_ALERT_THRESHOLD,
};
use crate::validation;
use crate::ClinicError;

fn not_found(budget_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("budget {}", budget_id))
}

fn duplicate(category: &str, month: YearMonth) -> ClinicError {
    ClinicError::Conflict(format!(
        "an active budget for {} already exists for {}-{:02}",
        category, month.year, month.month
    ))
}

fn threshold(value: Option<u8>) -> Result<u8, ClinicError> {
    let value = value.unwrap_or(DEFAULT_ALERT_THRESHOLD);
    if !(1..=100).contains(&value) {
        return Err(ClinicError::validation(
            "alert_threshold",
            "must be between 1 and 100",
        ));
    }
    Ok(value)
}

impl<'a> Ledger<'a> {
    pub fn create_budget(&self, doctor: DoctorId, input: &NewBudget) -> Result<Budget, ClinicError> {
        let category = validation::required_max(
            "category",
            &input.category,
            validation::MAX_CATEGORY_NAME_LEN,
        )?;
        let month = YearMonth::new(input.year, input.month)?;
        let limit = validation::positive("monthly_limit", input.monthly_limit)?;
        let threshold = threshold(input.alert_threshold)?;

        let tx = self.db.begin()?;
        if self.db.find_active_budget(doctor, &category, month)?.is_some() {
            return Err(duplicate(&category, month));
        }
        let budget = self
            .db
            .insert_budget(doctor, &category, month, limit, threshold, db::now())
            .map_err(|e| map_unique(e, &category, month))?;
        tx.commit()?;

        info!(doctor = %doctor, budget_id = budget.id, category = %budget.category, "Created budget");
        Ok(budget)
    }

    /// Budgets newest month first, optionally for one month.
    pub fn list_budgets(&self, doctor: DoctorId, month: Option<YearMonth>) -> Result<Vec<Budget>, ClinicError> {
        Ok(self.db.list_budgets(doctor, month)?)
    }

    pub fn get_budget(&self, doctor: DoctorId, budget_id: i64) -> Result<Budget, ClinicError> {
        self.db
            .get_budget(doctor, budget_id)?
            .ok_or_else(|| not_found(budget_id))
    }

    pub fn update_budget(
        &self,
        doctor: DoctorId,
        budget_id: i64,
        update: &BudgetUpdate,
    ) -> Result<Budget, ClinicError> {
        let limit = validation::positive("monthly_limit", update.monthly_limit)?;
        let threshold = threshold(update.alert_threshold)?;
        if !self.db.update_budget_row(doctor, budget_id, limit, threshold)? {
            return Err(not_found(budget_id));
        }
        info!(doctor = %doctor, budget_id, "Updated budget");
        self.get_budget(doctor, budget_id)
    }

    pub fn delete_budget(&self, doctor: DoctorId, budget_id: i64) -> Result<(), ClinicError> {
        if !self.db.delete_budget_row(doctor, budget_id)? {
            return Err(not_found(budget_id));
        }
        info!(doctor = %doctor, budget_id, "Deleted budget");
        Ok(())
    }

    /// Activating fails with a conflict while another active budget covers
    /// the same category and month.
    pub fn set_budget_active(
        &self,
        doctor: DoctorId,
        budget_id: i64,
        active: bool,
    ) -> Result<Budget, ClinicError> {
        let existing = self.get_budget(doctor, budget_id)?;
        self.db
            .set_budget_active(doctor, budget_id, active)
            .map_err(|e| map_unique(e, &existing.category, existing.year_month()))?;
        info!(doctor = %doctor, budget_id, active, "Toggled budget");
        self.get_budget(doctor, budget_id)
    }

    /// Flip the active flag.
    pub fn toggle_budget(&self, doctor: DoctorId, budget_id: i64) -> Result<Budget, ClinicError> {
        let existing = self.get_budget(doctor, budget_id)?;
        self.set_budget_active(doctor, budget_id, !existing.is_active)
    }

    /// Spending against the active budget for a category and month.
    pub fn check_budget(
        &self,
        doctor: DoctorId,
        category: &str,
        month: YearMonth,
    ) -> Result<BudgetStatus, ClinicError> {
        let budget = self
            .db
            .find_active_budget(doctor, category.trim(), month)?
            .ok_or_else(|| {
                ClinicError::NotFound(format!(
                    "budget for {} in {}-{:02}",
                    category.trim(),
                    month.year,
                    month.month
                ))
            })?;
        let spent = self.month_spending(doctor, &budget.category, month)?;
        debug!(doctor = %doctor, category = %budget.category, spent = %spent, "Checked budget");
        Ok(BudgetStatus::compute(&budget, spent)?)
    }

    /// Status of every active budget of a month.
    pub fn budget_overview(&self, doctor: DoctorId, month: YearMonth) -> Result<Vec<BudgetStatus>, ClinicError> {
        self.db
            .list_budgets(doctor, Some(month))?
            .into_iter()
            .filter(|b| b.is_active)
            .map(|b| {
                let spent = self.month_spending(doctor, &b.category, month)?;
                Ok(BudgetStatus::compute(&b, spent)?)
            })
            .collect()
    }

    fn month_spending(&self, doctor: DoctorId, category: &str, month: YearMonth) -> Result<Money, ClinicError> {
        let period = Period::month(month);
        Ok(self.db.sum_transactions(
            doctor,
            Direction::Expense,
            Some(category),
            period.start_datetime(),
            period.end_datetime_exclusive(),
        )?)
    }
}

fn map_unique(error: DbError, category: &str, month: YearMonth) -> ClinicError {
    if error.is_unique_violation() {
        duplicate(category, month)
    } else {
        error.into()
    }
}
