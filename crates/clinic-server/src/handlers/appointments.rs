//! Appointment and calendar routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use clinic_core::models::{
    Appointment, AppointmentUpdate, CalendarEvent, NewAppointment, PatientAppointments,
};
use serde::Deserialize;

use super::{today, PeriodQuery};
use crate::error::ApiError;
use crate::extract::{AppJson, AppPath, AppQuery, CurrentDoctor};
use crate::AppState;

/// Scheduling form: the patient plus the appointment fields.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub patient_local_id: i64,
    #[serde(flatten)]
    pub appointment: NewAppointment,
}

/// `GET /api/appointments?from=&to=`
pub async fn list(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let period = query.resolve(today())?;
    let appointments = state
        .run(move |core| core.list_appointments(doctor.id, &period))
        .await?;
    Ok(Json(appointments))
}

/// `POST /api/appointments`
pub async fn schedule(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppJson(input): AppJson<ScheduleRequest>,
) -> Result<(StatusCode, Json<Appointment>), ApiError> {
    let appointment = state
        .run(move |core| {
            core.schedule_appointment(doctor.id, input.patient_local_id, &input.appointment)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// `GET /api/appointments/:id`
pub async fn get(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(appointment_id): AppPath<i64>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state
        .run(move |core| core.get_appointment(doctor.id, appointment_id))
        .await?;
    Ok(Json(appointment))
}

/// `PUT /api/appointments/:id`: absent fields stay unchanged.
pub async fn update(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(appointment_id): AppPath<i64>,
    AppJson(update): AppJson<AppointmentUpdate>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = state
        .run(move |core| core.update_appointment(doctor.id, appointment_id, &update))
        .await?;
    Ok(Json(appointment))
}

/// `DELETE /api/appointments/:id`
pub async fn delete(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(appointment_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_appointment(doctor.id, appointment_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/patients/:local_id/appointments`
pub async fn for_patient(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
) -> Result<Json<PatientAppointments>, ApiError> {
    let appointments = state
        .run(move |core| core.patient_appointments(doctor.id, local_id))
        .await?;
    Ok(Json(appointments))
}

/// `GET /api/calendar?from=&to=`
pub async fn calendar(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<PeriodQuery>,
) -> Result<Json<Vec<CalendarEvent>>, ApiError> {
    let period = query.resolve(today())?;
    let events = state
        .run(move |core| core.calendar_events(doctor.id, &period))
        .await?;
    Ok(Json(events))
}
