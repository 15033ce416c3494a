//! Core data models for the biodiversity record service.
//!
//! Row types map to SQLite tables via `sqlx::FromRow`; view types are the
//! statically declared JSON shapes returned by the API.

pub mod account;
pub mod media;
pub mod page;
pub mod record;
pub mod species;
