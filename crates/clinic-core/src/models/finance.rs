//! Financial ledger models: transactions, categories, budgets and the
//! aggregates computed over them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::appointment::text_enum;
use super::{de_datetime, Appointment, DoctorId, Money, MoneyError, Period, YearMonth};

/// Built-in expense categories, always available to every doctor.
pub const DEFAULT_EXPENSE_CATEGORIES: &[&str] = &[
    "General",
    "Equipment",
    "Supplies",
    "Utilities",
    "Rent",
    "Staff",
    "Marketing",
    "Insurance",
    "Maintenance",
    "Other",
];

/// Built-in income categories, always available to every doctor.
pub const DEFAULT_INCOME_CATEGORIES: &[&str] =
    &["Patient Payment", "Insurance", "Consultation", "Procedure", "Other"];

/// Category used for payments recorded from visits.
pub const PATIENT_PAYMENT_CATEGORY: &str = "Patient Payment";
/// Category used when a visit payment is reduced.
pub const PATIENT_REFUND_CATEGORY: &str = "Patient Refund";

pub const DEFAULT_CATEGORY_COLOR: &str = "#6c757d";
pub const DEFAULT_ALERT_THRESHOLD: u8 = 80;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn default_categories(&self) -> &'static [&'static str] {
        match self {
            Direction::Income => DEFAULT_INCOME_CATEGORIES,
            Direction::Expense => DEFAULT_EXPENSE_CATEGORIES,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Check,
}

/// What a transaction refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Patient,
    Visit,
    Appointment,
    Manual,
}

text_enum!(Direction, "transaction type", {
    Direction::Income => "income",
    Direction::Expense => "expense",
});

text_enum!(PaymentMethod, "payment method", {
    PaymentMethod::Cash => "cash",
    PaymentMethod::Card => "card",
    PaymentMethod::BankTransfer => "bank_transfer",
    PaymentMethod::Check => "check",
});

text_enum!(ReferenceKind, "reference type", {
    ReferenceKind::Patient => "patient",
    ReferenceKind::Visit => "visit",
    ReferenceKind::Appointment => "appointment",
    ReferenceKind::Manual => "manual",
});

/// Optional link from a transaction to another record.
///
/// The id is informational; referenced rows may be deleted while the
/// transaction is kept as financial history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Reference {
    pub kind: ReferenceKind,
    #[serde(default)]
    pub id: Option<i64>,
}

impl Reference {
    pub fn visit(id: i64) -> Self {
        Self {
            kind: ReferenceKind::Visit,
            id: Some(id),
        }
    }
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub doctor_id: DoctorId,
    pub direction: Direction,
    pub category: String,
    pub subcategory: Option<String>,
    /// Always positive; `direction` carries the sign
    pub amount: Money,
    pub description: Option<String>,
    pub transaction_date: NaiveDateTime,
    pub payment_method: Option<PaymentMethod>,
    pub reference: Option<Reference>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Amount with the direction's sign applied.
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Income => self.amount,
            Direction::Expense => Money::ZERO - self.amount,
        }
    }
}

/// Transaction form input; also used for full updates.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub direction: Direction,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub amount: Money,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "de_datetime")]
    pub transaction_date: NaiveDateTime,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference: Option<Reference>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewTransaction {
    pub fn new(
        direction: Direction,
        category: impl Into<String>,
        amount: Money,
        transaction_date: NaiveDateTime,
    ) -> Self {
        Self {
            direction,
            category: category.into(),
            subcategory: None,
            amount,
            description: None,
            transaction_date,
            payment_method: None,
            reference: None,
            notes: None,
        }
    }
}

/// Filters for listing transactions; all optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Income and expense totals over a period.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub total_income: Money,
    pub total_expense: Money,
    pub net: Money,
    pub income_by_category: BTreeMap<String, Money>,
    pub expense_by_category: BTreeMap<String, Money>,
    pub transaction_count: usize,
}

/// A custom category created by a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub doctor_id: DoctorId,
    pub name: String,
    pub description: Option<String>,
    pub kind: Direction,
    /// `#rrggbb`
    pub color: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: Direction,
    #[serde(default)]
    pub color: Option<String>,
}

/// Edit of a custom category; its kind cannot change.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryUpdate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// An entry of the category picker: a built-in default or a custom
/// category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryOption {
    pub name: String,
    pub kind: Direction,
    pub is_default: bool,
    /// Id of the custom category; `None` for defaults
    pub id: Option<i64>,
    pub color: String,
}

/// A monthly spending limit for one expense category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Budget {
    pub id: i64,
    pub doctor_id: DoctorId,
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub monthly_limit: Money,
    /// Percent of the limit at which the budget is flagged
    pub alert_threshold: u8,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Budget {
    pub fn year_month(&self) -> YearMonth {
        YearMonth {
            year: self.year,
            month: self.month,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBudget {
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub monthly_limit: Money,
    #[serde(default)]
    pub alert_threshold: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetUpdate {
    pub monthly_limit: Money,
    #[serde(default)]
    pub alert_threshold: Option<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLevel {
    Ok,
    Warning,
    Danger,
}

/// Spending against a budget for one month.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetStatus {
    pub category: String,
    pub year: i32,
    pub month: u32,
    pub limit: Money,
    pub spent: Money,
    pub remaining: Money,
    pub percent_used: f64,
    pub over_budget: bool,
    pub over_threshold: bool,
    pub level: BudgetLevel,
}

impl BudgetStatus {
    pub fn compute(budget: &Budget, spent: Money) -> Result<Self, MoneyError> {
        let percent_used = spent.percent_of(budget.monthly_limit);
        let threshold = f64::from(budget.alert_threshold);
        let over_threshold = percent_used >= threshold;
        let level = if percent_used < 50.0 {
            BudgetLevel::Ok
        } else if percent_used < threshold {
            BudgetLevel::Warning
        } else {
            BudgetLevel::Danger
        };

        Ok(Self {
            category: budget.category.clone(),
            year: budget.year,
            month: budget.month,
            limit: budget.monthly_limit,
            spent,
            remaining: budget.monthly_limit.checked_sub(spent)?,
            percent_used,
            over_budget: spent > budget.monthly_limit,
            over_threshold,
            level,
        })
    }
}

/// Overview for the landing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dashboard {
    pub total_patients: usize,
    pub completed_patients: usize,
    /// Patients whose first visit falls in the current month
    pub new_patients_this_month: usize,
    /// Patients with a visit or appointment in the last 180 days
    pub active_patients: usize,
    pub visits_this_month: usize,
    pub appointments_today: usize,
    pub appointments_this_month: usize,
    pub month_income: Money,
    pub month_expense: Money,
    pub month_net: Money,
    /// Sum of unpaid balances over all patients
    pub outstanding_balance: Money,
    pub upcoming_appointments: Vec<Appointment>,
}
