//! Clinic Core Library
//!
//! Multi-doctor clinic records: patients, visits with X-ray images,
//! appointments and a per-doctor financial ledger, persisted in SQLite.
//!
//! # Architecture
//!
//! ```text
//!              HTTP session ──► DoctorId
//!                                  │
//!   ┌──────────┬──────────┬────────┼────────┬──────────┬──────────┐
//!   ▼          ▼          ▼        ▼        ▼          ▼          ▼
//! Accounts  Registry  VisitLog  Calendar  Ledger  ReportExporter  │
//!   │          │          │        │        │          │          │
//!   └──────────┴──────┬───┴────────┴────────┴──────────┘     XrayStore
//!                     ▼                                    (upload root)
//!            SQLite (doctor_id on every row)
//! ```
//!
//! # Core Principle
//!
//! **Every operation is scoped to one doctor.** The doctor id is an explicit
//! argument of every call and part of every query's `WHERE` clause; a row
//! owned by another doctor is reported exactly like a missing one.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Patient, Visit, Appointment, Transaction, etc.)
//! - [`accounts`]: Registration, password hashing and sessions
//! - [`registry`]: Patients with per-doctor local ids
//! - [`visits`]: Visit log and X-ray attachments
//! - [`calendar`]: Appointments and the calendar feed
//! - [`ledger`]: Transactions, categories, budgets and the dashboard
//! - [`export`]: CSV and JSON reports
//! - [`storage`]: X-ray file storage

pub mod accounts;
pub mod calendar;
pub mod config;
pub mod db;
pub mod export;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod storage;
pub mod validation;
pub mod visits;

pub use accounts::{Accounts, NewAccount, PasswordChange};
pub use calendar::Calendar;
pub use config::ClinicConfig;
pub use db::{Database, DbError};
pub use export::{ReportExporter, ReportFormat, ReportKind};
pub use ledger::Ledger;
pub use registry::Registry;
pub use storage::{StorageError, StoredFile, Upload, XrayStore};
pub use visits::VisitLog;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use tracing::{error, info};

use models::*;

// =========================================================================
// Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Database(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClinicError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ClinicError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn error_type(&self) -> &'static str {
        match self {
            ClinicError::Validation { .. } => "validation_error",
            ClinicError::Authentication(_) => "authentication_error",
            ClinicError::NotFound(_) => "not_found",
            ClinicError::Conflict(_) => "conflict",
            ClinicError::Storage(e) if e.is_rejection() => "upload_rejected",
            ClinicError::Storage(_) => "storage_error",
            ClinicError::Database(_) => "database_error",
            ClinicError::Internal(_) => "internal_error",
        }
    }

    /// Server-side failures whose detail must not reach the client.
    pub fn is_internal(&self) -> bool {
        match self {
            ClinicError::Storage(e) => !e.is_rejection(),
            ClinicError::Database(_) | ClinicError::Internal(_) => true,
            _ => false,
        }
    }
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => ClinicError::NotFound(what),
            DbError::Constraint(message) => ClinicError::Conflict(message),
            e if e.is_unique_violation() => ClinicError::Conflict("record already exists".into()),
            e => ClinicError::Database(e),
        }
    }
}

impl From<rusqlite::Error> for ClinicError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::Internal(format!("serialization failed: {}", e))
    }
}

impl From<MoneyError> for ClinicError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::Overflow => ClinicError::Internal("amount arithmetic overflowed".into()),
            other => ClinicError::validation("amount", other.to_string()),
        }
    }
}

impl<T> From<PoisonError<T>> for ClinicError {
    fn from(e: PoisonError<T>) -> Self {
        ClinicError::Internal(format!("lock poisoned: {}", e))
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe entry point owning the connection and the X-ray store.
///
/// Calls block on SQLite and the filesystem; async callers should run them
/// on a blocking pool.
pub struct ClinicCore {
    db: Mutex<Database>,
    store: XrayStore,
    config: ClinicConfig,
}

impl ClinicCore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P, config: ClinicConfig) -> ClinicResult<Self> {
        let db = Database::open(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            upload_root = %config.upload_root.display(),
            "Opened clinic database"
        );
        Ok(Self::with_database(db, config))
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(config: ClinicConfig) -> ClinicResult<Self> {
        Ok(Self::with_database(Database::open_in_memory()?, config))
    }

    fn with_database(db: Database, config: ClinicConfig) -> Self {
        Self {
            db: Mutex::new(db),
            store: XrayStore::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    fn lock(&self) -> ClinicResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|e| {
            error!("Database lock poisoned");
            ClinicError::from(e)
        })
    }

    /// Lock for recording files written beforehand; they are removed if
    /// the lock is unusable.
    fn lock_or_discard(&self, staged: &[StoredFile]) -> ClinicResult<MutexGuard<'_, Database>> {
        self.lock().map_err(|e| {
            self.store.discard(staged);
            e
        })
    }

    fn accounts<'a>(&self, db: &'a Database) -> Accounts<'a> {
        Accounts::new(db, self.config.session_ttl)
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    // Argon2 work runs between lock scopes so one login does not stall
    // every other doctor's requests.

    pub fn register(&self, input: &NewDoctor) -> ClinicResult<Doctor> {
        let account = NewAccount::prepare(input)?;
        let db = self.lock()?;
        self.accounts(&db).create_account(&account)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> ClinicResult<Session> {
        let creds = {
            let db = self.lock()?;
            self.accounts(&db).find_login(username)?
        };
        let doctor = accounts::check_login(creds.as_ref(), password)?;
        let db = self.lock()?;
        self.accounts(&db).open_session(doctor)
    }

    pub fn resolve_session(&self, token: &str) -> ClinicResult<DoctorId> {
        let db = self.lock()?;
        self.accounts(&db).resolve_session(token)
    }

    pub fn logout(&self, token: &str) -> ClinicResult<()> {
        let db = self.lock()?;
        self.accounts(&db).logout(token)
    }

    pub fn get_profile(&self, doctor: DoctorId) -> ClinicResult<Doctor> {
        let db = self.lock()?;
        self.accounts(&db).get_profile(doctor)
    }

    pub fn update_profile(&self, doctor: DoctorId, update: &ProfileUpdate) -> ClinicResult<Doctor> {
        let db = self.lock()?;
        self.accounts(&db).update_profile(doctor, update)
    }

    /// Change the password; sessions other than `keep_token` are revoked.
    pub fn change_password(
        &self,
        doctor: DoctorId,
        current: &str,
        new: &str,
        keep_token: Option<&str>,
    ) -> ClinicResult<()> {
        let stored = {
            let db = self.lock()?;
            self.accounts(&db).password_hash(doctor)?
        };
        let change = PasswordChange::prepare(doctor, stored, current, new)?;
        let db = self.lock()?;
        self.accounts(&db).apply_password_change(&change, keep_token)
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn create_patient(&self, doctor: DoctorId, input: &NewPatient) -> ClinicResult<Patient> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).create_patient(doctor, input)
    }

    pub fn get_patient(&self, doctor: DoctorId, local_id: i64) -> ClinicResult<Patient> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).get_patient(doctor, local_id)
    }

    pub fn list_patients(&self, doctor: DoctorId) -> ClinicResult<Vec<Patient>> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).list_patients(doctor)
    }

    pub fn search_patients(&self, doctor: DoctorId, query: &str) -> ClinicResult<Vec<Patient>> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).search_patients(doctor, query)
    }

    pub fn update_patient(
        &self,
        doctor: DoctorId,
        local_id: i64,
        update: &PatientUpdate,
    ) -> ClinicResult<Patient> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).update_patient(doctor, local_id, update)
    }

    pub fn delete_patient(&self, doctor: DoctorId, local_id: i64) -> ClinicResult<DeletedPatient> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).delete_patient(doctor, local_id)
    }

    pub fn patient_balance(&self, doctor: DoctorId, local_id: i64) -> ClinicResult<PatientBalance> {
        let db = self.lock()?;
        Registry::new(&db, &self.store).patient_balance(doctor, local_id)
    }

    // =========================================================================
    // Visit Operations
    // =========================================================================

    pub fn record_visit(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        input: &NewVisit,
        attachments: &[Upload],
    ) -> ClinicResult<Visit> {
        visits::clean_new_visit(input)?;
        let stored = self.store.store_all(doctor, attachments)?;
        let db = self.lock_or_discard(&stored)?;
        VisitLog::new(&db, &self.store).record_staged_visit(doctor, patient_local_id, input, &stored)
    }

    pub fn get_visit(&self, doctor: DoctorId, visit_id: i64) -> ClinicResult<Visit> {
        let db = self.lock()?;
        VisitLog::new(&db, &self.store).get_visit(doctor, visit_id)
    }

    pub fn list_visits(&self, doctor: DoctorId, patient_local_id: i64) -> ClinicResult<Vec<Visit>> {
        let db = self.lock()?;
        VisitLog::new(&db, &self.store).list_visits(doctor, patient_local_id)
    }

    pub fn update_visit(
        &self,
        doctor: DoctorId,
        visit_id: i64,
        update: &VisitUpdate,
        attachments: &[Upload],
    ) -> ClinicResult<Visit> {
        visits::clean_visit_update(update)?;
        let stored = self.store.store_all(doctor, attachments)?;
        let db = self.lock_or_discard(&stored)?;
        VisitLog::new(&db, &self.store).update_staged_visit(doctor, visit_id, update, &stored)
    }

    pub fn delete_visit(&self, doctor: DoctorId, visit_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        VisitLog::new(&db, &self.store).delete_visit(doctor, visit_id)
    }

    pub fn get_xray(&self, doctor: DoctorId, xray_id: i64) -> ClinicResult<(XrayFile, Vec<u8>)> {
        let db = self.lock()?;
        VisitLog::new(&db, &self.store).get_xray(doctor, xray_id)
    }

    pub fn delete_xray(&self, doctor: DoctorId, xray_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        VisitLog::new(&db, &self.store).delete_xray(doctor, xray_id)
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    pub fn schedule_appointment(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
        input: &NewAppointment,
    ) -> ClinicResult<Appointment> {
        let db = self.lock()?;
        Calendar::new(&db).schedule_appointment(doctor, patient_local_id, input)
    }

    pub fn list_appointments(&self, doctor: DoctorId, period: &Period) -> ClinicResult<Vec<Appointment>> {
        let db = self.lock()?;
        Calendar::new(&db).list_appointments(doctor, period)
    }

    pub fn get_appointment(&self, doctor: DoctorId, appointment_id: i64) -> ClinicResult<Appointment> {
        let db = self.lock()?;
        Calendar::new(&db).get_appointment(doctor, appointment_id)
    }

    pub fn update_appointment(
        &self,
        doctor: DoctorId,
        appointment_id: i64,
        update: &AppointmentUpdate,
    ) -> ClinicResult<Appointment> {
        let db = self.lock()?;
        Calendar::new(&db).update_appointment(doctor, appointment_id, update)
    }

    pub fn delete_appointment(&self, doctor: DoctorId, appointment_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        Calendar::new(&db).delete_appointment(doctor, appointment_id)
    }

    /// Upcoming and missed appointments as of now.
    pub fn patient_appointments(
        &self,
        doctor: DoctorId,
        patient_local_id: i64,
    ) -> ClinicResult<PatientAppointments> {
        let db = self.lock()?;
        Calendar::new(&db).patient_appointments(doctor, patient_local_id, db::now())
    }

    pub fn calendar_events(&self, doctor: DoctorId, period: &Period) -> ClinicResult<Vec<CalendarEvent>> {
        let db = self.lock()?;
        Calendar::new(&db).calendar_events(doctor, period)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    pub fn record_transaction(&self, doctor: DoctorId, input: &NewTransaction) -> ClinicResult<Transaction> {
        let db = self.lock()?;
        Ledger::new(&db).record_transaction(doctor, input)
    }

    pub fn get_transaction(&self, doctor: DoctorId, transaction_id: i64) -> ClinicResult<Transaction> {
        let db = self.lock()?;
        Ledger::new(&db).get_transaction(doctor, transaction_id)
    }

    pub fn update_transaction(
        &self,
        doctor: DoctorId,
        transaction_id: i64,
        input: &NewTransaction,
    ) -> ClinicResult<Transaction> {
        let db = self.lock()?;
        Ledger::new(&db).update_transaction(doctor, transaction_id, input)
    }

    pub fn delete_transaction(&self, doctor: DoctorId, transaction_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        Ledger::new(&db).delete_transaction(doctor, transaction_id)
    }

    pub fn list_transactions(
        &self,
        doctor: DoctorId,
        filter: &TransactionFilter,
    ) -> ClinicResult<Vec<Transaction>> {
        let db = self.lock()?;
        Ledger::new(&db).list_transactions(doctor, filter)
    }

    pub fn summarize(&self, doctor: DoctorId, period: &Period) -> ClinicResult<Summary> {
        let db = self.lock()?;
        Ledger::new(&db).summarize(doctor, period)
    }

    pub fn list_categories(
        &self,
        doctor: DoctorId,
        kind: Option<Direction>,
    ) -> ClinicResult<Vec<CategoryOption>> {
        let db = self.lock()?;
        Ledger::new(&db).list_categories(doctor, kind)
    }

    pub fn list_custom_categories(
        &self,
        doctor: DoctorId,
        kind: Option<Direction>,
    ) -> ClinicResult<Vec<Category>> {
        let db = self.lock()?;
        Ledger::new(&db).list_custom_categories(doctor, kind)
    }

    pub fn create_category(&self, doctor: DoctorId, input: &NewCategory) -> ClinicResult<Category> {
        let db = self.lock()?;
        Ledger::new(&db).create_category(doctor, input)
    }

    pub fn update_category(
        &self,
        doctor: DoctorId,
        category_id: i64,
        update: &CategoryUpdate,
    ) -> ClinicResult<Category> {
        let db = self.lock()?;
        Ledger::new(&db).update_category(doctor, category_id, update)
    }

    pub fn set_category_active(
        &self,
        doctor: DoctorId,
        category_id: i64,
        active: bool,
    ) -> ClinicResult<Category> {
        let db = self.lock()?;
        Ledger::new(&db).set_category_active(doctor, category_id, active)
    }

    pub fn toggle_category(&self, doctor: DoctorId, category_id: i64) -> ClinicResult<Category> {
        let db = self.lock()?;
        Ledger::new(&db).toggle_category(doctor, category_id)
    }

    pub fn delete_category(&self, doctor: DoctorId, category_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        Ledger::new(&db).delete_category(doctor, category_id)
    }

    pub fn create_budget(&self, doctor: DoctorId, input: &NewBudget) -> ClinicResult<Budget> {
        let db = self.lock()?;
        Ledger::new(&db).create_budget(doctor, input)
    }

    pub fn list_budgets(&self, doctor: DoctorId, month: Option<YearMonth>) -> ClinicResult<Vec<Budget>> {
        let db = self.lock()?;
        Ledger::new(&db).list_budgets(doctor, month)
    }

    pub fn get_budget(&self, doctor: DoctorId, budget_id: i64) -> ClinicResult<Budget> {
        let db = self.lock()?;
        Ledger::new(&db).get_budget(doctor, budget_id)
    }

    pub fn update_budget(
        &self,
        doctor: DoctorId,
        budget_id: i64,
        update: &BudgetUpdate,
    ) -> ClinicResult<Budget> {
        let db = self.lock()?;
        Ledger::new(&db).update_budget(doctor, budget_id, update)
    }

    pub fn delete_budget(&self, doctor: DoctorId, budget_id: i64) -> ClinicResult<()> {
        let db = self.lock()?;
        Ledger::new(&db).delete_budget(doctor, budget_id)
    }

    pub fn set_budget_active(&self, doctor: DoctorId, budget_id: i64, active: bool) -> ClinicResult<Budget> {
        let db = self.lock()?;
        Ledger::new(&db).set_budget_active(doctor, budget_id, active)
    }

    pub fn toggle_budget(&self, doctor: DoctorId, budget_id: i64) -> ClinicResult<Budget> {
        let db = self.lock()?;
        Ledger::new(&db).toggle_budget(doctor, budget_id)
    }

    pub fn check_budget(
        &self,
        doctor: DoctorId,
        category: &str,
        month: YearMonth,
    ) -> ClinicResult<BudgetStatus> {
        let db = self.lock()?;
        Ledger::new(&db).check_budget(doctor, category, month)
    }

    pub fn budget_overview(&self, doctor: DoctorId, month: YearMonth) -> ClinicResult<Vec<BudgetStatus>> {
        let db = self.lock()?;
        Ledger::new(&db).budget_overview(doctor, month)
    }

    /// Dashboard as of `now`.
    pub fn dashboard(&self, doctor: DoctorId, now: NaiveDateTime) -> ClinicResult<Dashboard> {
        let db = self.lock()?;
        Ledger::new(&db).dashboard(doctor, now)
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    pub fn export_csv(&self, doctor: DoctorId, kind: ReportKind, period: &Period) -> ClinicResult<String> {
        let db = self.lock()?;
        ReportExporter::new(&db).export_csv(doctor, kind, period)
    }

    pub fn export_json(&self, doctor: DoctorId, kind: ReportKind, period: &Period) -> ClinicResult<String> {
        let db = self.lock()?;
        ReportExporter::new(&db).export_json(doctor, kind, period)
    }

    pub fn export_report(
        &self,
        doctor: DoctorId,
        kind: ReportKind,
        period: &Period,
        format: ReportFormat,
    ) -> ClinicResult<String> {
        let db = self.lock()?;
        ReportExporter::new(&db).export(doctor, kind, period, format)
    }
}
