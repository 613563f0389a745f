//! Ledger routes: transactions, categories, budgets and the dashboard.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use clinic_core::db;
use clinic_core::models::{
    Budget, BudgetStatus, BudgetUpdate, Category, CategoryOption, CategoryUpdate, Dashboard,
    Direction, NewBudget, NewCategory, NewTransaction, Summary, Transaction, TransactionFilter,
};
use serde::Deserialize;

use super::{today, MonthQuery, PeriodQuery};
use crate::error::ApiError;
use crate::extract::{AppJson, AppPath, AppQuery, CurrentDoctor};
use crate::AppState;

/// `?from=&to=&type=&category=`
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(flatten)]
    pub period: PeriodQuery,
    #[serde(default, rename = "type")]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    #[serde(default, rename = "type")]
    pub direction: Option<Direction>,
}

/// `?category=&year=&month=`; flattening [`MonthQuery`] would lose the
/// numeric fields.
#[derive(Debug, Deserialize)]
pub struct BudgetCheckQuery {
    pub category: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
}

/// `GET /api/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
) -> Result<Json<Dashboard>, ApiError> {
    let dashboard = state
        .run(move |core| core.dashboard(doctor.id, db::now()))
        .await?;
    Ok(Json(dashboard))
}

/// `GET /api/transactions`
pub async fn list_transactions(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let filter = TransactionFilter {
        period: query.period.resolve_optional(today())?,
        direction: query.direction,
        category: query
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
    };
    let transactions = state
        .run(move |core| core.list_transactions(doctor.id, &filter))
        .await?;
    Ok(Json(transactions))
}

/// `POST /api/transactions`
pub async fn record_transaction(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let transaction = state
        .run(move |core| core.record_transaction(doctor.id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// `GET /api/transactions/:id`
pub async fn get_transaction(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(transaction_id): AppPath<i64>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state
        .run(move |core| core.get_transaction(doctor.id, transaction_id))
        .await?;
    Ok(Json(transaction))
}

/// `PUT /api/transactions/:id`
pub async fn update_transaction(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(transaction_id): AppPath<i64>,
    AppJson(input): AppJson<NewTransaction>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state
        .run(move |core| core.update_transaction(doctor.id, transaction_id, &input))
        .await?;
    Ok(Json(transaction))
}

/// `DELETE /api/transactions/:id`
pub async fn delete_transaction(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(transaction_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_transaction(doctor.id, transaction_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/finance/summary?from=&to=`
pub async fn summary(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Summary>, ApiError> {
    let period = query.resolve(today())?;
    let summary = state
        .run(move |core| core.summarize(doctor.id, &period))
        .await?;
    Ok(Json(summary))
}

/// `GET /api/categories?type=`: picker entries, defaults first.
pub async fn list_categories(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<KindQuery>,
) -> Result<Json<Vec<CategoryOption>>, ApiError> {
    let options = state
        .run(move |core| core.list_categories(doctor.id, query.direction))
        .await?;
    Ok(Json(options))
}

/// `GET /api/categories/custom?type=`: including inactive ones.
pub async fn list_custom_categories(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<KindQuery>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state
        .run(move |core| core.list_custom_categories(doctor.id, query.direction))
        .await?;
    Ok(Json(categories))
}

/// `POST /api/categories`
pub async fn create_category(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state
        .run(move |core| core.create_category(doctor.id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// `PUT /api/categories/:id`
pub async fn update_category(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(category_id): AppPath<i64>,
    AppJson(update): AppJson<CategoryUpdate>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .run(move |core| core.update_category(doctor.id, category_id, &update))
        .await?;
    Ok(Json(category))
}

/// `POST /api/categories/:id/toggle`
pub async fn toggle_category(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(category_id): AppPath<i64>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .run(move |core| core.toggle_category(doctor.id, category_id))
        .await?;
    Ok(Json(category))
}

/// `DELETE /api/categories/:id`
pub async fn delete_category(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(category_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_category(doctor.id, category_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/budgets?year=&month=`
pub async fn list_budgets(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<MonthQuery>,
) -> Result<Json<Vec<Budget>>, ApiError> {
    let month = query.resolve_optional(today())?;
    let budgets = state
        .run(move |core| core.list_budgets(doctor.id, month))
        .await?;
    Ok(Json(budgets))
}

/// `POST /api/budgets`
pub async fn create_budget(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<NewBudget>,
) -> Result<(StatusCode, Json<Budget>), ApiError> {
    let budget = state
        .run(move |core| core.create_budget(doctor.id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(budget)))
}

/// `PUT /api/budgets/:id`
pub async fn update_budget(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(budget_id): AppPath<i64>,
    AppJson(update): AppJson<BudgetUpdate>,
) -> Result<Json<Budget>, ApiError> {
    let budget = state
        .run(move |core| core.update_budget(doctor.id, budget_id, &update))
        .await?;
    Ok(Json(budget))
}

/// `POST /api/budgets/:id/toggle`
pub async fn toggle_budget(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(budget_id): AppPath<i64>,
) -> Result<Json<Budget>, ApiError> {
    let budget = state
        .run(move |core| core.toggle_budget(doctor.id, budget_id))
        .await?;
    Ok(Json(budget))
}

/// `DELETE /api/budgets/:id`
pub async fn delete_budget(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(budget_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_budget(doctor.id, budget_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/budgets/check?category=&year=&month=`
pub async fn check_budget(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<BudgetCheckQuery>,
) -> Result<Json<BudgetStatus>, ApiError> {
    let month = MonthQuery {
        year: query.year,
        month: query.month,
    }
    .resolve(today())?;
    let status = state
        .run(move |core| core.check_budget(doctor.id, &query.category, month))
        .await?;
    Ok(Json(status))
}

/// `GET /api/budgets/overview?year=&month=`
pub async fn budget_overview(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<MonthQuery>,
) -> Result<Json<Vec<BudgetStatus>>, ApiError> {
    let month = query.resolve(today())?;
    let overview = state
        .run(move |core| core.budget_overview(doctor.id, month))
        .await?;
    Ok(Json(overview))
}
