use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{cell_routes, AppointmentState};

pub fn create_router(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Doctor booking API is running!" }))
        .merge(cell_routes(state))
}
