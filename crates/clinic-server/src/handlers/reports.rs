//! Report downloads.

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use clinic_core::export::file_name;
use clinic_core::{ReportFormat, ReportKind};
use serde::Deserialize;

use super::{today, PeriodQuery};
use crate::error::ApiError;
use crate::extract::{AppQuery, CurrentDoctor};
use crate::AppState;

/// `?kind=financial|visits&from=&to=&format=csv|json`
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub from: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub to: Option<chrono::NaiveDate>,
}

/// `GET /api/reports/export`: an attachment named after the kind and
/// period.
pub async fn export(
    State(state): State<AppState>,
    doctor: CurrentDoctor,
    AppQuery(query): AppQuery<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = match query.kind.as_deref() {
        Some(kind) => kind.parse::<ReportKind>()?,
        None => ReportKind::Financial,
    };
    let format = match query.format.as_deref() {
        Some(format) => format.parse::<ReportFormat>()?,
        None => ReportFormat::default(),
    };
    let period = PeriodQuery {
        from: query.from,
        to: query.to,
    }
    .resolve(today())?;

    let body = state
        .run(move |core| core.export_report(doctor.id, kind, &period, format))
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file_name(kind, &period, format)
    );

    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
