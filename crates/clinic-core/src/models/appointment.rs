//! Appointment calendar models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{de_datetime, de_opt_datetime, DoctorId};

/// Default appointment length in minutes.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    /// Patient attended but the appointment was not finished
    Incomplete,
}

/// Appointment priority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A scheduled appointment for one patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub doctor_id: DoctorId,
    pub patient_local_id: i64,
    pub scheduled_at: NaiveDateTime,
    /// Free-form type, e.g. "checkup" or "follow-up"
    pub appointment_type: String,
    pub notes: Option<String>,
    pub duration_minutes: u32,
    pub priority: Priority,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    pub fn ends_at(&self) -> NaiveDateTime {
        self.scheduled_at + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Scheduling input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointment {
    #[serde(deserialize_with = "de_datetime")]
    pub scheduled_at: NaiveDateTime,
    pub appointment_type: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl NewAppointment {
    pub fn new(scheduled_at: NaiveDateTime, appointment_type: impl Into<String>) -> Self {
        Self {
            scheduled_at,
            appointment_type: appointment_type.into(),
            notes: None,
            duration_minutes: None,
            priority: None,
        }
    }
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentUpdate {
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub scheduled_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub appointment_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

/// What a calendar entry represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Visit,
    Appointment,
}

/// One entry in the merged calendar feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub kind: EventKind,
    /// Visit or appointment id
    pub id: i64,
    pub patient_local_id: i64,
    pub title: String,
    pub start: NaiveDateTime,
    pub duration_minutes: Option<u32>,
    pub detail: Option<String>,
}

/// A patient's upcoming and missed appointments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientAppointments {
    pub upcoming: Vec<Appointment>,
    pub missed: Vec<Appointment>,
}

macro_rules! text_enum {
    ($ty:ty, $err:literal, { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(format!(concat!("unknown ", $err, ": {}"), other)),
                }
            }
        }
    };
}

pub(crate) use text_enum;

text_enum!(AppointmentStatus, "appointment status", {
    AppointmentStatus::Scheduled => "scheduled",
    AppointmentStatus::Completed => "completed",
    AppointmentStatus::Cancelled => "cancelled",
    AppointmentStatus::Incomplete => "incomplete",
});

text_enum!(Priority, "priority", {
    Priority::Low => "low",
    Priority::Medium => "medium",
    Priority::High => "high",
    Priority::Urgent => "urgent",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Incomplete,
        ] {
            assert_eq!(status.as_str().parse::<AppointmentStatus>(), Ok(status));
        }
        assert!("missed".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn test_ends_at() {
        let start = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let appointment = Appointment {
            id: 1,
            doctor_id: DoctorId(1),
            patient_local_id: 1,
            scheduled_at: start,
            appointment_type: "checkup".into(),
            notes: None,
            duration_minutes: 45,
            priority: Priority::Medium,
            status: AppointmentStatus::Scheduled,
            created_at: start,
        };
        assert_eq!(appointment.ends_at().format("%H:%M").to_string(), "09:45");
    }

    #[test]
    fn test_new_appointment_accepts_form_datetime() {
        let input: NewAppointment = serde_json::from_str(
            r#"{"scheduled_at": "2024-06-01T09:00", "appointment_type": "checkup"}"#,
        )
        .unwrap();
        assert_eq!(input.duration_minutes, None);
        assert_eq!(input.scheduled_at.format("%H:%M").to_string(), "09:00");
    }
}
