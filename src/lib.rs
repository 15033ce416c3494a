//! Biodiversity observation records: a multi-user HTTP API for geotagged
//! wildlife sightings with media, access-scoped queries, bulk export,
//! species aggregation and a one-way verification action.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use services::{
    account_service::AccountService, anchor::Anchor, media_store::MediaStore,
    record_service::RecordService,
};
use sqlx::SqlitePool;
use state::{AppState, Pagination};
use std::sync::Arc;

/// Wire services into the shared handler state.
pub fn app_state(
    db: Arc<SqlitePool>,
    media: MediaStore,
    anchor: Arc<dyn Anchor>,
    pagination: Pagination,
) -> AppState {
    AppState {
        records: RecordService::new(db.clone(), media, anchor),
        accounts: AccountService::new(db),
        pagination,
    }
}
