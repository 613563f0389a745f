//! Registration, login and profile routes.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use chrono::NaiveDateTime;
use clinic_core::models::{Doctor, DoctorId, NewDoctor, ProfileUpdate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::extract::{clear_session_cookie, session_cookie, AppJson, CurrentDoctor};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub doctor_id: DoctorId,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    AppJson(input): AppJson<NewDoctor>,
) -> Result<(StatusCode, Json<Doctor>), ApiError> {
    let doctor = state.run(move |core| core.register(&input)).await?;
    Ok((StatusCode::CREATED, Json(doctor)))
}

/// `POST /api/auth/login`: returns the token and sets the session cookie.
pub async fn login(
    State(state): State<AppState>,
    AppJson(input): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .run(move |core| core.authenticate(&input.username, &input.password))
        .await?;
    let max_age = state.core.config().session_ttl.num_seconds();
    let cookie = session_cookie(&session.token, max_age);

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(LoginResponse {
            token: session.token,
            doctor_id: session.doctor_id,
            expires_at: session.expires_at,
        }),
    ))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
) -> Result<impl IntoResponse, ApiError> {
    let token = doctor.token.clone();
    state.run(move |core| core.logout(&token)).await?;
    info!(doctor = %doctor.id, "Logged out");
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, clear_session_cookie())]),
    ))
}

/// `GET /api/profile`
pub async fn profile(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
) -> Result<Json<Doctor>, ApiError> {
    let profile = state.run(move |core| core.get_profile(doctor.id)).await?;
    Ok(Json(profile))
}

/// `PUT /api/profile`
pub async fn update_profile(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<Json<Doctor>, ApiError> {
    let profile = state
        .run(move |core| core.update_profile(doctor.id, &update))
        .await?;
    Ok(Json(profile))
}

/// `POST /api/profile/password`: other sessions of the doctor are ended.
pub async fn change_password(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<PasswordChange>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| {
            core.change_password(
                doctor.id,
                &input.current_password,
                &input.new_password,
                Some(doctor.token.as_str()),
            )
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
