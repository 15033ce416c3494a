//! Defines routes for the record, species and health endpoints.
//!
//! ## Structure
//! - **Record endpoints**
//!   - `GET    /records` filtered, paginated list
//!   - `POST   /records` multipart create
//!   - `GET    /records/export` CSV or JSON export
//!   - `GET    /records/{id}` fetch one
//!   - `PUT    /records/{id}` multipart replace
//!   - `PATCH  /records/{id}` multipart partial update
//!   - `DELETE /records/{id}` delete with media
//!   - `POST   /records/{id}/validate` verification action
//!   - `GET    /records/{id}/media/{kind}` stream an attachment
//!
//! - **Species**
//!   - `GET    /species` distinct species with observation counts
//!
//! The static `export` segment takes precedence over `{id}`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        record_handlers::{
            create_record, delete_record, export_records, get_media, get_record, list_records,
            patch_record, replace_record, validate_record,
        },
        species_handlers::list_species,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Request body ceiling; media uploads are far larger than axum's default.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Build the application router. State is supplied by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Record collection
        .route("/records", get(list_records).post(create_record))
        .route("/records/export", get(export_records))
        // Single record
        .route(
            "/records/{id}",
            get(get_record)
                .put(replace_record)
                .patch(patch_record)
                .delete(delete_record),
        )
        .route("/records/{id}/validate", post(validate_record))
        .route("/records/{id}/media/{kind}", get(get_media))
        // Aggregates
        .route("/species", get(list_species))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
