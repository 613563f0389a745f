//! Custom ledger categories alongside the built-in defaults.

use tracing::info;

use super::Ledger;
use crate::db;
use crate::models::{
    Category, CategoryOption, CategoryUpdate, Direction, DoctorId, NewCategory,
    DEFAULT_CATEGORY_COLOR,
};
use crate::validation;
use crate::ClinicError;

fn not_found(category_id: i64) -> ClinicError {
    ClinicError::NotFound(format!("category {}", category_id))
}

fn is_default(kind: Direction, name: &str) -> bool {
    kind.default_categories()
        .iter()
        .any(|d| d.eq_ignore_ascii_case(name))
}

fn clean_color(color: Option<&str>) -> Result<String, ClinicError> {
    match color.map(str::trim).filter(|c| !c.is_empty()) {
        Some(color) => validation::hex_color(color),
        None => Ok(DEFAULT_CATEGORY_COLOR.to_string()),
    }
}

impl<'a> Ledger<'a> {
    /// Category picker entries: defaults first, then active custom
    /// categories, for one kind or both.
    pub fn list_categories(
        &self,
        doctor: DoctorId,
        kind: Option<Direction>,
    ) -> Result<Vec<CategoryOption>, ClinicError> {
        let kinds: &[Direction] = match kind {
            Some(Direction::Income) => &[Direction::Income],
            Some(Direction::Expense) => &[Direction::Expense],
            None => &[Direction::Income, Direction::Expense],
        };
        let custom = self.db.list_categories(doctor, kind)?;

        let mut options = Vec::new();
        for &kind in kinds {
            options.extend(kind.default_categories().iter().map(|name| CategoryOption {
                name: name.to_string(),
                kind,
                is_default: true,
                id: None,
                color: DEFAULT_CATEGORY_COLOR.to_string(),
            }));
            options.extend(
                custom
                    .iter()
                    .filter(|c| c.kind == kind && c.is_active)
                    .map(|c| CategoryOption {
                        name: c.name.clone(),
                        kind,
                        is_default: false,
                        id: Some(c.id),
                        color: c.color.clone(),
                    }),
            );
        }
        Ok(options)
    }

    /// Every custom category, active or not, for management screens.
    pub fn list_custom_categories(
        &self,
        doctor: DoctorId,
        kind: Option<Direction>,
    ) -> Result<Vec<Category>, ClinicError> {
        Ok(self.db.list_categories(doctor, kind)?)
    }

    pub fn create_category(&self, doctor: DoctorId, input: &NewCategory) -> Result<Category, ClinicError> {
        let name = validation::required_max("name", &input.name, validation::MAX_CATEGORY_NAME_LEN)?;
        if is_default(input.kind, &name) {
            return Err(ClinicError::Conflict(format!(
                "{} is a built-in {} category",
                name, input.kind
            )));
        }
        let description = validation::optional(input.description.as_deref());
        let color = clean_color(input.color.as_deref())?;

        let category = self
            .db
            .insert_category(doctor, &name, description.as_deref(), input.kind, &color, db::now())
            .map_err(|e| {
                if e.is_unique_violation() {
                    ClinicError::Conflict(format!("category {} already exists", name))
                } else {
                    e.into()
                }
            })?;

        info!(doctor = %doctor, category_id = category.id, kind = %category.kind, "Created category");
        Ok(category)
    }

    /// Rename or recolor a custom category. A rename is carried over to the
    /// transactions and budgets that use the old name.
    pub fn update_category(
        &self,
        doctor: DoctorId,
        category_id: i64,
        update: &CategoryUpdate,
    ) -> Result<Category, ClinicError> {
        let name = validation::required_max("name", &update.name, validation::MAX_CATEGORY_NAME_LEN)?;
        let description = validation::optional(update.description.as_deref());
        let color = clean_color(update.color.as_deref())?;

        let tx = self.db.begin()?;
        let existing = self
            .db
            .get_category(doctor, category_id)?
            .ok_or_else(|| not_found(category_id))?;
        if is_default(existing.kind, &name) {
            return Err(ClinicError::Conflict(format!(
                "{} is a built-in {} category",
                name, existing.kind
            )));
        }

        self.db
            .update_category_row(doctor, category_id, &name, description.as_deref(), &color)
            .map_err(|e| {
                if e.is_unique_violation() {
                    ClinicError::Conflict(format!("category {} already exists", name))
                } else {
                    e.into()
                }
            })?;
        if existing.name != name {
            let renamed = self
                .db
                .rename_transaction_category(doctor, existing.kind, &existing.name, &name)?;
            if existing.kind == Direction::Expense {
                self.db.rename_budget_category(doctor, &existing.name, &name)?;
            }
            info!(doctor = %doctor, category_id, transactions = renamed, "Renamed category");
        }
        let category = self
            .db
            .get_category(doctor, category_id)?
            .ok_or_else(|| not_found(category_id))?;
        tx.commit()?;
        Ok(category)
    }

    /// Activate or deactivate; inactive categories are hidden from pickers
    /// but stay on existing transactions.
    pub fn set_category_active(
        &self,
        doctor: DoctorId,
        category_id: i64,
        active: bool,
    ) -> Result<Category, ClinicError> {
        if !self.db.set_category_active(doctor, category_id, active)? {
            return Err(not_found(category_id));
        }
        info!(doctor = %doctor, category_id, active, "Toggled category");
        self.db
            .get_category(doctor, category_id)?
            .ok_or_else(|| not_found(category_id))
    }

    pub fn toggle_category(&self, doctor: DoctorId, category_id: i64) -> Result<Category, ClinicError> {
        let existing = self
            .db
            .get_category(doctor, category_id)?
            .ok_or_else(|| not_found(category_id))?;
        self.set_category_active(doctor, category_id, !existing.is_active)
    }

    /// Delete a category no transaction uses. Categories in use can only
    /// be deactivated.
    pub fn delete_category(&self, doctor: DoctorId, category_id: i64) -> Result<(), ClinicError> {
        let tx = self.db.begin()?;
        let existing = self
            .db
            .get_category(doctor, category_id)?
            .ok_or_else(|| not_found(category_id))?;
        if self.db.category_in_use(doctor, existing.kind, &existing.name)? {
            return Err(ClinicError::Conflict(format!(
                "category {} is used by transactions; deactivate it instead",
                existing.name
            )));
        }
        self.db.delete_category_row(doctor, category_id)?;
        tx.commit()?;

        info!(doctor = %doctor, category_id, "Deleted category");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{on, setup};
    use super::*;
    use crate::models::{Money, NewBudget, NewTransaction, TransactionFilter};

    fn new_category(name: &str, kind: Direction) -> NewCategory {
        NewCategory {
            name: name.to_string(),
            description: None,
            kind,
            color: None,
        }
    }

    #[test]
    fn test_list_merges_defaults_and_active_custom() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);

        let lab = ledger
            .create_category(doctor, &new_category("Lab", Direction::Expense))
            .unwrap();
        let old = ledger
            .create_category(doctor, &new_category("Old", Direction::Expense))
            .unwrap();
        ledger.set_category_active(doctor, old.id, false).unwrap();

        let expense = ledger.list_categories(doctor, Some(Direction::Expense)).unwrap();
        assert_eq!(expense.len(), crate::models::DEFAULT_EXPENSE_CATEGORIES.len() + 1);
        let custom: Vec<_> = expense.iter().filter(|o| !o.is_default).collect();
        assert_eq!(custom.len(), 1);
        assert_eq!(custom[0].id, Some(lab.id));
        assert_eq!(custom[0].color, DEFAULT_CATEGORY_COLOR);

        let income = ledger.list_categories(doctor, Some(Direction::Income)).unwrap();
        assert!(income.iter().all(|o| o.kind == Direction::Income));
    }

    #[test]
    fn test_duplicates_conflict() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);

        assert!(matches!(
            ledger.create_category(doctor, &new_category("rent", Direction::Expense)),
            Err(ClinicError::Conflict(_))
        ));
        ledger
            .create_category(doctor, &new_category("Lab", Direction::Expense))
            .unwrap();
        assert!(matches!(
            ledger.create_category(doctor, &new_category("Lab", Direction::Expense)),
            Err(ClinicError::Conflict(_))
        ));
        // same name as income is a different category
        assert!(ledger
            .create_category(doctor, &new_category("Lab", Direction::Income))
            .is_ok());
    }

    #[test]
    fn test_bad_color_rejected() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        let mut input = new_category("Lab", Direction::Expense);
        input.color = Some("red".into());
        assert!(matches!(
            ledger.create_category(doctor, &input),
            Err(ClinicError::Validation { ref field, .. }) if field == "color"
        ));
    }

    #[test]
    fn test_rename_carries_over() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        let lab = ledger
            .create_category(doctor, &new_category("Lab", Direction::Expense))
            .unwrap();
        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Expense, "Lab", Money::from_major(10), on(2024, 5, 2)),
            )
            .unwrap();
        ledger
            .create_budget(
                doctor,
                &NewBudget {
                    category: "Lab".into(),
                    year: 2024,
                    month: 5,
                    monthly_limit: Money::from_major(100),
                    alert_threshold: None,
                },
            )
            .unwrap();

        let update = CategoryUpdate {
            name: "Laboratory".into(),
            description: None,
            color: Some("#AABBCC".into()),
        };
        let renamed = ledger.update_category(doctor, lab.id, &update).unwrap();
        assert_eq!(renamed.name, "Laboratory");
        assert_eq!(renamed.color, "#aabbcc");

        let filter = TransactionFilter {
            category: Some("Laboratory".into()),
            ..TransactionFilter::default()
        };
        assert_eq!(ledger.list_transactions(doctor, &filter).unwrap().len(), 1);
        assert_eq!(ledger.list_budgets(doctor, None).unwrap()[0].category, "Laboratory");
    }

    #[test]
    fn test_delete_blocked_while_in_use() {
        let (db, doctor) = setup();
        let ledger = Ledger::new(&db);
        let lab = ledger
            .create_category(doctor, &new_category("Lab", Direction::Expense))
            .unwrap();
        let unused = ledger
            .create_category(doctor, &new_category("Unused", Direction::Expense))
            .unwrap();
        ledger
            .record_transaction(
                doctor,
                &NewTransaction::new(Direction::Expense, "Lab", Money::from_major(10), on(2024, 5, 2)),
            )
            .unwrap();

        assert!(matches!(ledger.delete_category(doctor, lab.id), Err(ClinicError::Conflict(_))));
        ledger.delete_category(doctor, unused.id).unwrap();
        assert!(matches!(
            ledger.set_category_active(doctor, unused.id, true),
            Err(ClinicError::NotFound(_))
        ));
    }

    #[test]
    fn test_other_doctor_cannot_touch_category() {
        let (db, doctor) = setup();
        let other = db.insert_doctor("wilson", "h", "", None, db::now()).unwrap().id;
        let ledger = Ledger::new(&db);
        let lab = ledger
            .create_category(doctor, &new_category("Lab", Direction::Expense))
            .unwrap();

        let update = CategoryUpdate {
            name: "Mine".into(),
            description: None,
            color: None,
        };
        assert!(matches!(
            ledger.update_category(other, lab.id, &update),
            Err(ClinicError::NotFound(_))
        ));
        assert!(matches!(ledger.delete_category(other, lab.id), Err(ClinicError::NotFound(_))));
        assert!(ledger
            .list_categories(other, Some(Direction::Expense))
            .unwrap()
            .iter()
            .all(|o| o.is_default));
    }
}
