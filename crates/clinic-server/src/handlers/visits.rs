//! Visit and X-ray routes.
//!
//! Visit writes are `multipart/form-data`: one `visit` part holding the
//! JSON form and any number of `xray` file parts.

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use clinic_core::models::{NewVisit, Visit, VisitUpdate};
use clinic_core::Upload;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::extract::{AppPath, CurrentDoctor};
use crate::{AppState, MAX_XRAYS_PER_REQUEST};

const VISIT_PART: &str = "visit";
const XRAY_PART: &str = "xray";

/// Split a visit form into its JSON payload and X-ray uploads.
async fn read_visit_form<T: DeserializeOwned>(
    mut multipart: Multipart,
) -> Result<(T, Vec<Upload>), ApiError> {
    let mut form = None;
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            VISIT_PART => {
                let bytes = field.bytes().await?;
                let parsed = serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::BadRequest(format!("invalid visit form: {}", e)))?;
                form = Some(parsed);
            }
            XRAY_PART => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                if uploads.len() == MAX_XRAYS_PER_REQUEST {
                    return Err(ApiError::BadRequest(format!(
                        "at most {} X-rays per request",
                        MAX_XRAYS_PER_REQUEST
                    )));
                }
                uploads.push(Upload::new(file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let form = form.ok_or_else(|| ApiError::BadRequest("missing visit part".into()))?;
    Ok((form, uploads))
}

/// `GET /api/patients/:local_id/visits`
pub async fn list(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
) -> Result<Json<Vec<Visit>>, ApiError> {
    let visits = state
        .run(move |core| core.list_visits(doctor.id, local_id))
        .await?;
    Ok(Json(visits))
}

/// `POST /api/patients/:local_id/visits`
pub async fn record(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(local_id): AppPath<i64>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Visit>), ApiError> {
    let (input, uploads) = read_visit_form::<NewVisit>(multipart).await?;
    let visit = state
        .run(move |core| core.record_visit(doctor.id, local_id, &input, &uploads))
        .await?;
    Ok((StatusCode::CREATED, Json(visit)))
}

/// `GET /api/visits/:id`
pub async fn get(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(visit_id): AppPath<i64>,
) -> Result<Json<Visit>, ApiError> {
    let visit = state
        .run(move |core| core.get_visit(doctor.id, visit_id))
        .await?;
    Ok(Json(visit))
}

/// `PUT /api/visits/:id`
pub async fn update(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(visit_id): AppPath<i64>,
    multipart: Multipart,
) -> Result<Json<Visit>, ApiError> {
    let (update, uploads) = read_visit_form::<VisitUpdate>(multipart).await?;
    let visit = state
        .run(move |core| core.update_visit(doctor.id, visit_id, &update, &uploads))
        .await?;
    Ok(Json(visit))
}

/// `DELETE /api/visits/:id`
pub async fn delete(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(visit_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_visit(doctor.id, visit_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/xrays/:id`: the image bytes.
pub async fn download_xray(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(xray_id): AppPath<i64>,
) -> Result<Response, ApiError> {
    let (xray, bytes) = state
        .run(move |core| core.get_xray(doctor.id, xray_id))
        .await?;

    let display_name: String = xray
        .original_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    let disposition = format!("inline; filename=\"{}\"", display_name);
    Response::builder()
        .header(CONTENT_TYPE, xray.content_type)
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(format!("building X-ray response: {}", e)))
}

/// `DELETE /api/xrays/:id`
pub async fn delete_xray(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppPath(xray_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .run(move |core| core.delete_xray(doctor.id, xray_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
