pub mod enrichment;
pub mod push;
pub mod repository;

pub use push::{ConfiguredPushToken, PushTokenSource};
pub use repository::AppointmentRepository;
