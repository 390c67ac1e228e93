// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::replace_appointment)
                .patch(handlers::update_appointment),
        )
        .route("/{appointment_id}/notification", get(handlers::get_notification_appointment))

        // Doctor listings
        .route("/doctor/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/doctor/{doctor_id}/date", get(handlers::get_doctor_appointments_on_date))
        .route("/doctor/{doctor_id}/pending", get(handlers::get_pending_appointments))
        .route("/doctor/{doctor_id}/schedule", get(handlers::get_doctor_schedule))

        // Patient listings
        .route("/patient/{patient_id}/history", get(handlers::get_patient_history))
        .route("/patient/{patient_id}/upcoming", get(handlers::get_upcoming_appointments))
        .route("/patient/{patient_id}/past", get(handlers::get_past_appointments))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

pub fn user_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/push-token", get(handlers::fetch_push_token))
        .route("/{user_id}", get(handlers::get_user))
        .route("/{user_id}/details", get(handlers::get_user_details))
        .route("/{user_id}/symptoms", get(handlers::get_user_symptoms))
        .route("/{user_id}/push-token", put(handlers::update_push_token))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

pub fn doctor_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/{document_id}", get(handlers::get_doctor))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

/// Every route of the cell under its public prefix.
pub fn cell_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/users", user_routes(state.clone()))
        .nest("/doctors", doctor_routes(state))
}
