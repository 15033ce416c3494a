pub mod health_handlers;
pub mod multipart;
pub mod record_handlers;
pub mod species_handlers;
