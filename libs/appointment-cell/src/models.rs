// libs/appointment-cell/src/models.rs
use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use shared_database::Cursor;

// ==============================================================================
// COLLECTIONS AND FIELD NAMES
// ==============================================================================

pub const TABLE_APPOINTMENT: &str = "appointments";
pub const TABLE_USER_DATA: &str = "user_data";
pub const TABLE_SYMPTOM: &str = "symptoms";

pub const FIELD_USER_ID: &str = "user_id";
pub const FIELD_PATIENT_ID: &str = "patient_id";
pub const FIELD_DOCTOR_ID: &str = "doctor_id";
pub const FIELD_SELECTED_DATE: &str = "selected_date";
pub const FIELD_APPROVAL_STATUS: &str = "approval_status";
pub const FIELD_VISITED: &str = "is_visited";

// ==============================================================================
// CORE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentModel {
    /// Storage document id. Always backfilled from the document reference on
    /// reads; the embedded value is not trusted.
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub selected_date: DateTime<Utc>,
    pub approval_status: ApprovalStatus,
    pub is_visited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_details: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_details: Option<UserProfile>,
    pub symptom_details: Option<String>,
    pub suffering_day: Option<String>,
}

impl AppointmentModel {
    /// Copy without the embedded profile snapshots, which are joined in on
    /// read and never persisted back.
    pub fn without_profile_snapshots(&self) -> Self {
        Self {
            doctor_details: None,
            patient_details: None,
            ..self.clone()
        }
    }

    /// Copy with `selected_date` cut to the millisecond precision the store
    /// keeps.
    pub fn with_stored_precision(&self) -> Self {
        Self {
            selected_date: self.selected_date.trunc_subsecs(3),
            ..self.clone()
        }
    }
}

/// A user profile document. `Default` is the zero-valued profile returned
/// when a lookup by user id finds nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub contact_number: String,
    pub email: String,
    pub gender: String,
    pub dob: String,
    pub address: String,
    pub token: Option<String>,
    pub is_doctor: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SymptomModel {
    pub user_id: String,
    pub symptom_details: String,
    pub suffering_day: String,
}

// ==============================================================================
// PAGINATION
// ==============================================================================

/// Opaque position of the last appointment in a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(pub Cursor);

impl PageCursor {
    /// URL-safe token form used on the HTTP surface.
    pub fn encode(&self) -> String {
        // Serializing a `Cursor` (string + JSON value) cannot fail.
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> ApiResponse<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| AppointmentError::InvalidCursor)?;
        serde_json::from_slice(&bytes)
            .map(PageCursor)
            .map_err(|_| AppointmentError::InvalidCursor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedResponse {
    pub data: Vec<AppointmentModel>,
    /// Cursor of the last record in `data`, `None` for an empty page.
    pub last_document: Option<PageCursor>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum AppointmentError {
    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{count} profiles share user id {user_id}")]
    DuplicateProfile { user_id: String, count: usize },

    #[error("Appointment id is required")]
    MissingId,

    #[error("Invalid pagination cursor")]
    InvalidCursor,
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        AppointmentError::DataSource(format!("{:#}", err))
    }
}

/// Result envelope returned by every data-access operation.
pub type ApiResponse<T> = Result<T, AppointmentError>;
