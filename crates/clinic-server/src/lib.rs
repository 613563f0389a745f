//! Clinic HTTP server.
//!
//! A thin JSON layer over [`clinic_core::ClinicCore`]. Every protected
//! route resolves the session to a doctor id through
//! [`extract::CurrentDoctor`] and passes it to the core; core calls run on
//! the blocking pool.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use clinic_core::{ClinicCore, ClinicResult};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::handlers::{appointments, auth, finance, patients, reports, visits};

/// Upper bound on the number of X-ray parts in one visit request.
pub const MAX_XRAYS_PER_REQUEST: usize = 20;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ClinicCore>,
}

impl AppState {
    pub fn new(core: ClinicCore) -> Self {
        Self {
            core: Arc::new(core),
        }
    }

    /// Run a core call on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&ClinicCore) -> ClinicResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        Ok(tokio::task::spawn_blocking(move || f(&core)).await??)
    }

    fn body_limit(&self) -> usize {
        let per_file = usize::try_from(self.core.config().max_upload_bytes).unwrap_or(usize::MAX);
        per_file
            .saturating_mul(MAX_XRAYS_PER_REQUEST)
            .saturating_add(1024 * 1024)
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/profile", get(auth::profile).put(auth::update_profile))
        .route("/profile/password", post(auth::change_password))
        .route("/dashboard", get(finance::dashboard))
        .route("/patients", get(patients::list).post(patients::create))
        .route(
            "/patients/:local_id",
            get(patients::get).put(patients::update).delete(patients::delete),
        )
        .route("/patients/:local_id/balance", get(patients::balance))
        .route(
            "/patients/:local_id/visits",
            get(visits::list).post(visits::record),
        )
        .route(
            "/patients/:local_id/appointments",
            get(appointments::for_patient),
        )
        .route(
            "/visits/:id",
            get(visits::get).put(visits::update).delete(visits::delete),
        )
        .route("/xrays/:id", get(visits::download_xray).delete(visits::delete_xray))
        .route(
            "/appointments",
            get(appointments::list).post(appointments::schedule),
        )
        .route(
            "/appointments/:id",
            get(appointments::get)
                .put(appointments::update)
                .delete(appointments::delete),
        )
        .route("/calendar", get(appointments::calendar))
        .route(
            "/transactions",
            get(finance::list_transactions).post(finance::record_transaction),
        )
        .route(
            "/transactions/:id",
            get(finance::get_transaction)
                .put(finance::update_transaction)
                .delete(finance::delete_transaction),
        )
        .route("/finance/summary", get(finance::summary))
        .route(
            "/categories",
            get(finance::list_categories).post(finance::create_category),
        )
        .route("/categories/custom", get(finance::list_custom_categories))
        .route(
            "/categories/:id",
            axum::routing::put(finance::update_category).delete(finance::delete_category),
        )
        .route("/categories/:id/toggle", post(finance::toggle_category))
        .route("/budgets", get(finance::list_budgets).post(finance::create_budget))
        .route("/budgets/overview", get(finance::budget_overview))
        .route("/budgets/check", get(finance::check_budget))
        .route(
            "/budgets/:id",
            axum::routing::put(finance::update_budget).delete(finance::delete_budget),
        )
        .route("/budgets/:id/toggle", post(finance::toggle_budget))
        .route("/reports/export", get(reports::export));

    let body_limit = state.body_limit();
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
