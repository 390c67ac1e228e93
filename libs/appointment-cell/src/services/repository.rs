// libs/appointment-cell/src/services/repository.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::{Direction, Document, DocumentStore, Query};

use crate::models::{
    ApiResponse, AppointmentError, AppointmentModel, ApprovalStatus, PageCursor,
    PaginatedResponse, SymptomModel, UserProfile, FIELD_APPROVAL_STATUS, FIELD_DOCTOR_ID,
    FIELD_PATIENT_ID, FIELD_SELECTED_DATE, FIELD_USER_ID, FIELD_VISITED, TABLE_APPOINTMENT,
    TABLE_USER_DATA,
};
use crate::services::enrichment::{
    attach_doctor_profiles, profile_by_user_id, symptom_by_user_id,
};
use crate::services::push::PushTokenSource;

/// Which side of "now" a paginated listing covers.
#[derive(Debug, Clone, Copy)]
enum Window {
    /// `selected_date >= now`
    Upcoming,
    /// `selected_date < now`
    Past,
}

pub struct AppointmentRepository {
    store: Arc<dyn DocumentStore>,
    push_tokens: Arc<dyn PushTokenSource>,
    page_size: usize,
}

impl AppointmentRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        push_tokens: Arc<dyn PushTokenSource>,
        config: &AppConfig,
    ) -> Self {
        Self {
            store,
            push_tokens,
            page_size: config.pagination_limit.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // ==========================================================================
    // BOOKING AND UPDATES
    // ==========================================================================

    pub async fn add_booking(&self, appointment: &AppointmentModel) -> ApiResponse<String> {
        debug!(
            "Booking appointment for patient {} with doctor {}",
            appointment.patient_id, appointment.doctor_id
        );
        let stored = appointment.with_stored_precision();
        let id = self
            .store
            .add(TABLE_APPOINTMENT, to_document(&stored)?)
            .await?;
        info!("Appointment {} booked", id);
        Ok(id)
    }

    /// Overwrites the whole appointment document, embedded snapshots included.
    pub async fn update_appointment_data(
        &self,
        appointment: &AppointmentModel,
    ) -> ApiResponse<AppointmentModel> {
        let id = require_id(appointment)?;
        let stored = appointment.with_stored_precision();
        self.store
            .set(TABLE_APPOINTMENT, id, to_document(&stored)?)
            .await?;
        info!("Appointment {} overwritten", id);
        Ok(stored)
    }

    /// Overwrites the appointment document with the joined profile snapshots
    /// stripped. The returned copy keeps the snapshots.
    pub async fn update_appointment_data_by_id(
        &self,
        appointment: &AppointmentModel,
    ) -> ApiResponse<AppointmentModel> {
        let id = require_id(appointment)?;
        let updated = appointment.with_stored_precision();
        self.store
            .set(TABLE_APPOINTMENT, id, to_document(&updated.without_profile_snapshots())?)
            .await?;
        info!("Appointment {} updated ({})", id, appointment.approval_status);
        Ok(updated)
    }

    // ==========================================================================
    // PROFILE AND SYMPTOM LOOKUPS
    // ==========================================================================

    /// Profile for `user_id`, or the zero-valued profile when none exists.
    pub async fn get_user_by_id(&self, user_id: &str) -> ApiResponse<UserProfile> {
        debug!("Fetching profile for user {}", user_id);
        match profile_by_user_id(self.store.as_ref(), user_id).await? {
            Some(profile) => Ok(profile),
            None => {
                warn!("No profile for user {}, returning empty profile", user_id);
                Ok(UserProfile::default())
            }
        }
    }

    pub async fn get_appointment_user_details(&self, user_id: &str) -> ApiResponse<UserProfile> {
        self.get_user_by_id(user_id).await
    }

    pub async fn get_user_symptom_details(&self, user_id: &str) -> ApiResponse<SymptomModel> {
        debug!("Fetching symptoms for user {}", user_id);
        Ok(symptom_by_user_id(self.store.as_ref(), user_id)
            .await?
            .unwrap_or_default())
    }

    /// Profile document addressed by its storage id.
    pub async fn get_doctor_by_id(&self, document_id: &str) -> ApiResponse<UserProfile> {
        let document = self
            .store
            .get(TABLE_USER_DATA, document_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Profile {}", document_id)))?;
        Ok(document.decode()?)
    }

    // ==========================================================================
    // DOCTOR LISTINGS
    // ==========================================================================

    /// Every decided (approved or rejected) appointment of a doctor.
    pub async fn get_appointments_list(&self, doctor_id: &str) -> ApiResponse<Vec<AppointmentModel>> {
        let query = Query::collection(TABLE_APPOINTMENT)
            .where_eq(FIELD_DOCTOR_ID, doctor_id)
            .where_in(FIELD_APPROVAL_STATUS, statuses(&[ApprovalStatus::Approved, ApprovalStatus::Rejected]));
        self.fetch_appointments(&query).await
    }

    /// Decided appointments in `[date, date + 1 day]`.
    pub async fn get_appointments_selected_date_list(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
    ) -> ApiResponse<Vec<AppointmentModel>> {
        let query = day_range(doctor_id, date)
            .where_in(FIELD_APPROVAL_STATUS, statuses(&[ApprovalStatus::Approved, ApprovalStatus::Rejected]));
        self.fetch_appointments(&query).await
    }

    /// Pending appointments in `[start_date, end_date]`.
    pub async fn get_appointments_progress_list(
        &self,
        doctor_id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> ApiResponse<Vec<AppointmentModel>> {
        let query = Query::collection(TABLE_APPOINTMENT)
            .where_eq(FIELD_DOCTOR_ID, doctor_id)
            .where_eq(FIELD_APPROVAL_STATUS, ApprovalStatus::Pending.as_str())
            .where_gte(FIELD_SELECTED_DATE, start_date.timestamp_millis())
            .where_lte(FIELD_SELECTED_DATE, end_date.timestamp_millis());
        self.fetch_appointments(&query).await
    }

    /// Approved and pending appointments in `[date, date + 1 day]`, i.e. the
    /// slots already taken on that day.
    pub async fn get_doctor_appointment_by_date(
        &self,
        doctor_id: &str,
        date: DateTime<Utc>,
    ) -> ApiResponse<Vec<AppointmentModel>> {
        let query = day_range(doctor_id, date)
            .where_in(FIELD_APPROVAL_STATUS, statuses(&[ApprovalStatus::Approved, ApprovalStatus::Pending]));
        self.fetch_appointments(&query).await
    }

    // ==========================================================================
    // ENRICHED DETAILS
    // ==========================================================================

    /// One appointment with its doctor's profile joined in. `doctor_details`
    /// stays unset when the doctor has no profile.
    pub async fn get_appointment_details(&self, document_id: &str) -> ApiResponse<AppointmentModel> {
        let mut appointment = self.fetch_appointment(document_id).await?;
        appointment.doctor_details =
            profile_by_user_id(self.store.as_ref(), &appointment.doctor_id).await?;
        Ok(appointment)
    }

    /// One appointment with the patient's profile and symptom record joined
    /// in, as shown to a doctor opening a booking notification.
    pub async fn get_notification_appointment_details(
        &self,
        document_id: &str,
    ) -> ApiResponse<AppointmentModel> {
        let mut appointment = self.fetch_appointment(document_id).await?;
        appointment.patient_details =
            profile_by_user_id(self.store.as_ref(), &appointment.patient_id).await?;

        if let Some(symptom) = symptom_by_user_id(self.store.as_ref(), &appointment.patient_id).await? {
            appointment.symptom_details = Some(symptom.symptom_details);
            appointment.suffering_day = Some(symptom.suffering_day);
        }
        Ok(appointment)
    }

    /// Visited appointments of a patient, each with its doctor's profile.
    pub async fn get_appointments_history_list(
        &self,
        patient_id: &str,
    ) -> ApiResponse<Vec<AppointmentModel>> {
        let query = Query::collection(TABLE_APPOINTMENT)
            .where_eq(FIELD_PATIENT_ID, patient_id)
            .where_eq(FIELD_VISITED, true);
        let mut appointments = self.fetch_appointments(&query).await?;
        attach_doctor_profiles(self.store.as_ref(), &mut appointments).await?;
        Ok(appointments)
    }

    // ==========================================================================
    // PAGINATED PATIENT LISTINGS
    // ==========================================================================

    pub async fn get_upcoming_book_appointment_details_list(
        &self,
        patient_id: &str,
        cursor: Option<PageCursor>,
    ) -> ApiResponse<PaginatedResponse> {
        self.get_upcoming_book_appointment_details_list_at(patient_id, Utc::now(), cursor)
            .await
    }

    /// Upcoming page evaluated against an explicit `now`.
    pub async fn get_upcoming_book_appointment_details_list_at(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        cursor: Option<PageCursor>,
    ) -> ApiResponse<PaginatedResponse> {
        self.fetch_page(patient_id, Window::Upcoming, now, cursor).await
    }

    pub async fn get_past_book_appointment_details_list(
        &self,
        patient_id: &str,
        cursor: Option<PageCursor>,
    ) -> ApiResponse<PaginatedResponse> {
        self.get_past_book_appointment_details_list_at(patient_id, Utc::now(), cursor)
            .await
    }

    /// Past page evaluated against an explicit `now`.
    pub async fn get_past_book_appointment_details_list_at(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
        cursor: Option<PageCursor>,
    ) -> ApiResponse<PaginatedResponse> {
        self.fetch_page(patient_id, Window::Past, now, cursor).await
    }

    // ==========================================================================
    // PUSH TOKENS
    // ==========================================================================

    pub async fn fetch_push_token(&self) -> ApiResponse<String> {
        Ok(self.push_tokens.fetch_token().await?)
    }

    /// Stores `push_token` on the profile of `user_id`. The read and the write
    /// are separate store calls.
    pub async fn update_user_data(
        &self,
        push_token: Option<String>,
        user_id: &str,
    ) -> ApiResponse<bool> {
        let documents = self
            .store
            .query(
                &Query::collection(TABLE_USER_DATA)
                    .where_eq(FIELD_USER_ID, user_id)
                    .limit(2),
            )
            .await?;

        let document = match documents.as_slice() {
            [] => return Err(AppointmentError::NotFound(format!("Profile for user {}", user_id))),
            [document] => document,
            many => {
                return Err(AppointmentError::DuplicateProfile {
                    user_id: user_id.to_string(),
                    count: many.len(),
                })
            }
        };

        let mut profile: UserProfile = document.decode()?;
        profile.token = push_token;
        self.store
            .set(TABLE_USER_DATA, &document.id, to_document(&profile)?)
            .await?;

        info!("Push token updated for user {}", user_id);
        Ok(true)
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn fetch_appointment(&self, document_id: &str) -> ApiResponse<AppointmentModel> {
        debug!("Fetching appointment {}", document_id);
        let document = self
            .store
            .get(TABLE_APPOINTMENT, document_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {}", document_id)))?;
        appointment_from(&document)
    }

    async fn fetch_appointments(&self, query: &Query) -> ApiResponse<Vec<AppointmentModel>> {
        let documents = self.store.query(query).await?;
        debug!("{} appointments matched in {}", documents.len(), query.collection);
        documents.iter().map(appointment_from).collect()
    }

    async fn fetch_page(
        &self,
        patient_id: &str,
        window: Window,
        now: DateTime<Utc>,
        cursor: Option<PageCursor>,
    ) -> ApiResponse<PaginatedResponse> {
        debug!("Fetching {:?} page for patient {} (cursor: {})", window, patient_id, cursor.is_some());

        let base = Query::collection(TABLE_APPOINTMENT).where_eq(FIELD_PATIENT_ID, patient_id);
        let bounded = match window {
            Window::Upcoming => base.where_gte(FIELD_SELECTED_DATE, now.timestamp_millis()),
            Window::Past => base.where_lt(FIELD_SELECTED_DATE, now.timestamp_millis()),
        };
        let query = bounded
            .order_by(FIELD_SELECTED_DATE, Direction::Descending)
            .start_after(cursor.map(|cursor| cursor.0))
            .limit(self.page_size);

        let documents = self.store.query(&query).await?;
        let last_document = documents
            .last()
            .map(|document| PageCursor(document.cursor(FIELD_SELECTED_DATE)));

        let mut data = documents
            .iter()
            .map(appointment_from)
            .collect::<ApiResponse<Vec<_>>>()?;
        attach_doctor_profiles(self.store.as_ref(), &mut data).await?;

        Ok(PaginatedResponse { data, last_document })
    }
}

fn appointment_from(document: &Document) -> ApiResponse<AppointmentModel> {
    let mut appointment: AppointmentModel = document.decode()?;
    appointment.id = document.id.clone();
    Ok(appointment)
}

fn to_document<T: Serialize>(model: &T) -> ApiResponse<Value> {
    serde_json::to_value(model).map_err(|e| AppointmentError::DataSource(e.to_string()))
}

fn require_id(appointment: &AppointmentModel) -> ApiResponse<&str> {
    if appointment.id.trim().is_empty() {
        return Err(AppointmentError::MissingId);
    }
    Ok(&appointment.id)
}

fn statuses(values: &[ApprovalStatus]) -> Vec<&'static str> {
    values.iter().map(ApprovalStatus::as_str).collect()
}

/// Appointments of `doctor_id` within `[date, date + 1 day]`, both ends
/// inclusive.
fn day_range(doctor_id: &str, date: DateTime<Utc>) -> Query {
    let next_day = date + Duration::days(1);
    Query::collection(TABLE_APPOINTMENT)
        .where_eq(FIELD_DOCTOR_ID, doctor_id)
        .where_gte(FIELD_SELECTED_DATE, date.timestamp_millis())
        .where_lte(FIELD_SELECTED_DATE, next_day.timestamp_millis())
}
