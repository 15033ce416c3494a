//! Represents a geotagged biodiversity observation.

use crate::{geo::GeoPoint, models::media::MediaKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

/// A single observation row joined with its contributor's username.
///
/// The record stores metadata only; media payloads are tracked in
/// `record_media` and kept on disk.
#[derive(Clone, FromRow, Debug)]
pub struct Record {
    pub id: Uuid,

    /// Owning account. Set at creation and never changed.
    pub contributor_id: Uuid,

    pub contributor_username: String,

    /// Scientific name, e.g. "Accipiter cooperii".
    pub species_name: Option<String>,

    pub common_name: Option<String>,

    pub latitude: f64,

    pub longitude: f64,

    /// Free-text place name.
    pub location_name: Option<String>,

    /// When the organism was observed; independent of `created_at`.
    pub observation_date: DateTime<Utc>,

    pub notes: Option<String>,

    pub is_public: bool,

    /// Arbitrary structured output of an identification model.
    pub ai_prediction: Option<Json<Value>>,

    pub ai_confidence: Option<f64>,

    pub is_verified: bool,

    /// Assigned once by the verification action.
    pub verification_hash: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// API representation of a record.
#[derive(Serialize, Debug)]
pub struct RecordView {
    pub id: Uuid,
    pub contributor: Uuid,
    pub contributor_username: String,
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location: PointView,
    pub location_name: Option<String>,
    pub observation_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_public: bool,
    pub ai_prediction: Option<Value>,
    pub ai_confidence: Option<f64>,
    #[serde(rename = "blockchain_hash")]
    pub verification_hash: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordView {
    /// Build the view; `media` lists the kinds stored for this record.
    pub fn new(record: Record, media: &[MediaKind]) -> Self {
        let media_url = |kind: MediaKind| {
            media
                .contains(&kind)
                .then(|| format!("/records/{}/media/{}", record.id, kind))
        };
        let (image, audio, video) = (
            media_url(MediaKind::Image),
            media_url(MediaKind::Audio),
            media_url(MediaKind::Video),
        );

        Self {
            id: record.id,
            contributor: record.contributor_id,
            contributor_username: record.contributor_username,
            species_name: record.species_name,
            common_name: record.common_name,
            image,
            audio,
            video,
            latitude: record.latitude,
            longitude: record.longitude,
            location: PointView::new(record.latitude, record.longitude),
            location_name: record.location_name,
            observation_date: record.observation_date,
            notes: record.notes,
            is_public: record.is_public,
            ai_prediction: record.ai_prediction.map(|Json(v)| v),
            ai_confidence: record.ai_confidence,
            verification_hash: record.verification_hash,
            is_verified: record.is_verified,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// GeoJSON point; coordinates are `[longitude, latitude]`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PointView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coordinates: [f64; 2],
}

impl PointView {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            kind: "Point",
            coordinates: [longitude, latitude],
        }
    }
}

/// Result payload of the verification action.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VerificationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(rename = "blockchain_hash")]
    pub verification_hash: Option<String>,
}

impl VerificationOutcome {
    pub fn verified(hash: String) -> Self {
        Self {
            success: true,
            message: "Record verified on blockchain".into(),
            verification_hash: Some(hash),
        }
    }

    pub fn already_verified(hash: Option<String>) -> Self {
        Self {
            success: false,
            message: "Record already verified".into(),
            verification_hash: hash,
        }
    }
}
