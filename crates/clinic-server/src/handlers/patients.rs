//! Patient registry routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use clinic_core::models::{DeletedPatient, NewPatient, Patient, PatientBalance, PatientUpdate};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{AppJson, AppPath, AppQuery, CurrentDoctor};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

/// `GET /api/patients?q=`
pub async fn list(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    let patients = state
        .run(move |core| match query.q.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => core.search_patients(doctor.id, q),
            _ => core.list_patients(doctor.id),
        })
        .await?;
    Ok(Json(patients))
}

/// `POST /api/patients`
pub async fn create(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    let patient = state
        .run(move |core| core.create_patient(doctor.id, &input))
        .await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/:local_id`
pub async fn get(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
) -> Result<Json<Patient>, ApiError> {
    let patient = state
        .run(move |core| core.get_patient(doctor.id, local_id))
        .await?;
    Ok(Json(patient))
}

/// `PUT /api/patients/:local_id`
pub async fn update(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
    AppJson(input): AppJson<PatientUpdate>,
) -> Result<Json<Patient>, ApiError> {
    let patient = state
        .run(move |core| core.update_patient(doctor.id, local_id, &input))
        .await?;
    Ok(Json(patient))
}

/// `DELETE /api/patients/:local_id`: removes visits, X-rays and
/// appointments too.
pub async fn delete(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
) -> Result<Json<DeletedPatient>, ApiError> {
    let deleted = state
        .run(move |core| core.delete_patient(doctor.id, local_id))
        .await?;
    Ok(Json(deleted))
}

/// `GET /api/patients/:local_id/balance`
pub async fn balance(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
) -> Result<Json<PatientBalance>, ApiError> {
    let balance = state
        .run(move |core| core.patient_balance(doctor.id, local_id))
        .await?;
    Ok(Json(balance))
}
