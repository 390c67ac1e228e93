// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AppointmentError, AppointmentModel, PageCursor, PaginatedResponse};
use crate::services::{AppointmentRepository, ConfiguredPushToken, PushTokenSource};

// ==============================================================================
// STATE
// ==============================================================================

pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub repository: AppointmentRepository,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn DocumentStore>) -> Self {
        let push_tokens: Arc<dyn PushTokenSource> = Arc::new(ConfiguredPushToken::new(&config));
        Self::with_push_source(config, store, push_tokens)
    }

    pub fn with_push_source(
        config: Arc<AppConfig>,
        store: Arc<dyn DocumentStore>,
        push_tokens: Arc<dyn PushTokenSource>,
    ) -> Self {
        let repository = AppointmentRepository::new(store, push_tokens, &config);
        Self { config, repository }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::DuplicateProfile { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::MissingId | AppointmentError::InvalidCursor => {
                AppError::BadRequest(err.to_string())
            }
            AppointmentError::DataSource(_) => AppError::Database(err.to_string()),
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushTokenRequest {
    pub token: Option<String>,
}

fn page_json(page: PaginatedResponse) -> Value {
    json!({
        "data": page.data,
        "next_cursor": page.last_document.as_ref().map(PageCursor::encode),
    })
}

fn parse_cursor(query: PageQuery) -> Result<Option<PageCursor>, AppError> {
    query
        .cursor
        .filter(|token| !token.is_empty())
        .map(|token| PageCursor::decode(&token))
        .transpose()
        .map_err(AppError::from)
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Json(appointment): Json<AppointmentModel>,
) -> Result<Json<Value>, AppError> {
    let id = state.repository.add_booking(&appointment).await?;
    Ok(Json(json!({ "id": id })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.repository.get_appointment_details(&appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn replace_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
    Json(mut appointment): Json<AppointmentModel>,
) -> Result<Json<Value>, AppError> {
    appointment.id = appointment_id;
    let updated = state.repository.update_appointment_data(&appointment).await?;
    Ok(Json(json!(updated)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
    Json(mut appointment): Json<AppointmentModel>,
) -> Result<Json<Value>, AppError> {
    appointment.id = appointment_id;
    let updated = state.repository.update_appointment_data_by_id(&appointment).await?;
    Ok(Json(json!(updated)))
}

#[axum::debug_handler]
pub async fn get_notification_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .repository
        .get_notification_appointment_details(&appointment_id)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.repository.get_appointments_list(&doctor_id).await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments_on_date(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .repository
        .get_appointments_selected_date_list(&doctor_id, query.date)
        .await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_pending_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Value>, AppError> {
    if query.end < query.start {
        return Err(AppError::BadRequest("end must not precede start".to_string()));
    }
    let appointments = state
        .repository
        .get_appointments_progress_list(&doctor_id, query.start, query.end)
        .await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_schedule(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .repository
        .get_doctor_appointment_by_date(&doctor_id, query.date)
        .await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_patient_history(
    State(state): State<Arc<AppointmentState>>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.repository.get_appointments_history_list(&patient_id).await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_upcoming_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(patient_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let cursor = parse_cursor(query)?;
    let page = state
        .repository
        .get_upcoming_book_appointment_details_list(&patient_id, cursor)
        .await?;
    Ok(Json(page_json(page)))
}

#[axum::debug_handler]
pub async fn get_past_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(patient_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let cursor = parse_cursor(query)?;
    let page = state
        .repository
        .get_past_book_appointment_details_list(&patient_id, cursor)
        .await?;
    Ok(Json(page_json(page)))
}

// ==============================================================================
// USER AND DOCTOR HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_user(
    State(state): State<Arc<AppointmentState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let profile = state.repository.get_user_by_id(&user_id).await?;
    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn get_user_details(
    State(state): State<Arc<AppointmentState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let profile = state.repository.get_appointment_user_details(&user_id).await?;
    Ok(Json(json!(profile)))
}

#[axum::debug_handler]
pub async fn get_user_symptoms(
    State(state): State<Arc<AppointmentState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let symptoms = state.repository.get_user_symptom_details(&user_id).await?;
    Ok(Json(json!(symptoms)))
}

#[axum::debug_handler]
pub async fn fetch_push_token(
    State(state): State<Arc<AppointmentState>>,
) -> Result<Json<Value>, AppError> {
    let token = state
        .repository
        .fetch_push_token()
        .await
        .map_err(|e| AppError::ExternalService(e.to_string()))?;
    Ok(Json(json!({ "token": token })))
}

/// Stores a push token on the caller's own profile. Without a token in the
/// body the current registration token is fetched first.
#[axum::debug_handler]
pub async fn update_push_token(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(user_id): Path<String>,
    Json(request): Json<PushTokenRequest>,
) -> Result<Json<Value>, AppError> {
    if user.id != user_id {
        return Err(AppError::Auth("Cannot update another user's push token".to_string()));
    }

    let token = match request.token {
        Some(token) => token,
        None => {
            debug!("No token supplied for user {}, fetching registration token", user_id);
            state
                .repository
                .fetch_push_token()
                .await
                .map_err(|e| AppError::ExternalService(e.to_string()))?
        }
    };

    let updated = state.repository.update_user_data(Some(token), &user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppointmentState>>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.repository.get_doctor_by_id(&document_id).await?;
    Ok(Json(json!(doctor)))
}
