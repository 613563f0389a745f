//! Doctor account models.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identity of an authenticated doctor.
///
/// Every data-access call takes one of these explicitly; the only place a
/// `DoctorId` is produced from request input is session resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoctorId(pub i64);

impl fmt::Display for DoctorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A doctor account (without credentials).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: DoctorId,
    /// Login name, trimmed and lower-cased
    pub username: String,
    pub full_name: String,
    pub phone: Option<String>,
    /// Disabled accounts cannot log in
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDoctor {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Editable profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A logged-in session.
///
/// `token` is the bearer secret; it is handed out once and only its SHA-256
/// digest is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub doctor_id: DoctorId,
    pub expires_at: NaiveDateTime,
}

impl Doctor {
    /// Name shown in exports and greetings; falls back to the username.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}
