//! Represents a contributor or staff account.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// An account able to own records.
///
/// Accounts authenticate with an opaque bearer token; only its SHA-256
/// digest is persisted.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct Account {
    pub id: Uuid,

    /// Unique, human-readable handle shown as the record contributor.
    pub username: String,

    /// Staff accounts see and may modify every record.
    pub is_staff: bool,

    #[serde(skip)]
    pub token_hash: String,

    pub created_at: DateTime<Utc>,
}
