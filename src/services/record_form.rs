//! Validation of submitted record fields.
//!
//! A `RecordForm` holds the raw multipart text values plus any media already
//! staged to disk. It is turned into a `NewRecord` for creation or a
//! `RecordChanges` for updates.

use crate::{
    errors::{FieldErrors, NON_FIELD_ERRORS},
    geo::GeoPoint,
    services::{
        media_store::StagedMedia,
        query::{non_empty, parse_bool, parse_timestamp},
    },
};
use chrono::{DateTime, Utc};
use serde_json::Value;

const REQUIRED: &str = "This field is required.";
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Default)]
pub struct RecordForm {
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location_name: Option<String>,
    pub observation_date: Option<String>,
    pub notes: Option<String>,
    pub is_public: Option<String>,
    pub ai_prediction: Option<String>,
    pub ai_confidence: Option<String>,
    pub media: Vec<StagedMedia>,
}

impl RecordForm {
    /// Store a text field by name. Unknown names are ignored.
    pub fn set_text(&mut self, name: &str, value: String) {
        let slot = match name {
            "species_name" => &mut self.species_name,
            "common_name" => &mut self.common_name,
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "location_name" => &mut self.location_name,
            "observation_date" => &mut self.observation_date,
            "notes" => &mut self.notes,
            "is_public" => &mut self.is_public,
            "ai_prediction" => &mut self.ai_prediction,
            "ai_confidence" => &mut self.ai_confidence,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Validate for creation. Media presence is checked regardless of the
    /// other fields so a missing attachment is always reported.
    pub fn to_new_record(&self) -> Result<NewRecord, FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.media.is_empty() {
            errors.add(
                NON_FIELD_ERRORS,
                "At least one media file (image, audio, or video) must be provided.",
            );
        }
        self.check_media(&mut errors);

        let point = self.point(&mut errors, true);
        let observation_date = self.observation_date(&mut errors, true);
        let species_name = checked_name(&mut errors, "species_name", self.species_name.as_deref());
        let common_name = checked_name(&mut errors, "common_name", self.common_name.as_deref());
        let location_name =
            checked_name(&mut errors, "location_name", self.location_name.as_deref());
        let is_public = self.is_public(&mut errors).unwrap_or(true);
        let ai_prediction = self.ai_prediction(&mut errors).flatten();
        let ai_confidence = self.ai_confidence(&mut errors).flatten();

        let (Some(point), Some(observation_date)) = (point, observation_date) else {
            return Err(errors);
        };

        errors.into_result(NewRecord {
            species_name,
            common_name,
            point,
            location_name,
            observation_date,
            notes: non_empty(self.notes.as_deref()),
            is_public,
            ai_prediction,
            ai_confidence,
        })
    }

    /// Validate for update. A full update (`PUT`) requires the same core
    /// fields as creation; a partial one only validates what was sent.
    pub fn to_changes(&self, full: bool) -> Result<RecordChanges, FieldErrors> {
        let mut errors = FieldErrors::new();
        self.check_media(&mut errors);

        let point = self.point(&mut errors, full);
        let observation_date = self.observation_date(&mut errors, full);
        let species_name = self
            .species_name
            .as_deref()
            .map(|v| checked_name(&mut errors, "species_name", Some(v)));
        let common_name = self
            .common_name
            .as_deref()
            .map(|v| checked_name(&mut errors, "common_name", Some(v)));
        let location_name = self
            .location_name
            .as_deref()
            .map(|v| checked_name(&mut errors, "location_name", Some(v)));
        let is_public = self.is_public(&mut errors);
        let ai_prediction = self.ai_prediction(&mut errors);
        let ai_confidence = self.ai_confidence(&mut errors);

        errors.into_result(RecordChanges {
            species_name,
            common_name,
            point,
            location_name,
            observation_date,
            notes: self.notes.as_deref().map(|v| non_empty(Some(v))),
            is_public,
            ai_prediction,
            ai_confidence,
        })
    }

    fn check_media(&self, errors: &mut FieldErrors) {
        let mut seen = Vec::new();
        for staged in &self.media {
            if staged.size_bytes == 0 {
                errors.add(staged.kind.as_str(), "The submitted file is empty.");
            }
            if seen.contains(&staged.kind) {
                errors.add(staged.kind.as_str(), "Only one file may be uploaded per field.");
            }
            seen.push(staged.kind);
        }
    }

    fn point(&self, errors: &mut FieldErrors, required: bool) -> Option<GeoPoint> {
        let lat = non_empty(self.latitude.as_deref());
        let lng = non_empty(self.longitude.as_deref());

        match (lat, lng) {
            (None, None) => {
                if required {
                    errors.add("latitude", REQUIRED);
                    errors.add("longitude", REQUIRED);
                }
                None
            }
            (Some(_), None) => {
                errors.add("longitude", REQUIRED);
                None
            }
            (None, Some(_)) => {
                errors.add("latitude", REQUIRED);
                None
            }
            (Some(lat), Some(lng)) => {
                let lat = coordinate(errors, "latitude", &lat, 90.0);
                let lng = coordinate(errors, "longitude", &lng, 180.0);
                Some(GeoPoint::new(lat?, lng?))
            }
        }
    }

    fn observation_date(&self, errors: &mut FieldErrors, required: bool) -> Option<DateTime<Utc>> {
        match non_empty(self.observation_date.as_deref()) {
            Some(raw) => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    errors.add("observation_date", "Enter a valid date/time.");
                }
                parsed
            }
            None => {
                if required || self.observation_date.is_some() {
                    errors.add("observation_date", REQUIRED);
                }
                None
            }
        }
    }

    fn is_public(&self, errors: &mut FieldErrors) -> Option<bool> {
        let raw = non_empty(self.is_public.as_deref())?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            errors.add("is_public", "Must be a valid boolean.");
        }
        parsed
    }

    /// `Some(None)` means the field was sent empty and should be cleared.
    fn ai_prediction(&self, errors: &mut FieldErrors) -> Option<Option<Value>> {
        let raw = self.ai_prediction.as_deref()?;
        let Some(raw) = non_empty(Some(raw)) else {
            return Some(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Null) => Some(None),
            Ok(value) => Some(Some(value)),
            Err(_) => {
                errors.add("ai_prediction", "Value must be valid JSON.");
                None
            }
        }
    }

    fn ai_confidence(&self, errors: &mut FieldErrors) -> Option<Option<f64>> {
        let raw = self.ai_confidence.as_deref()?;
        let Some(raw) = non_empty(Some(raw)) else {
            return Some(None);
        };
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() && (0.0..=1.0).contains(&v) => Some(Some(v)),
            Ok(_) => {
                errors.add("ai_confidence", "Ensure this value is between 0 and 1.");
                None
            }
            Err(_) => {
                errors.add("ai_confidence", "A valid number is required.");
                None
            }
        }
    }
}

/// Validated fields of a record about to be inserted.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub point: GeoPoint,
    pub location_name: Option<String>,
    pub observation_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub is_public: bool,
    pub ai_prediction: Option<Value>,
    pub ai_confidence: Option<f64>,
}

/// Fields to overwrite on update. The outer `Option` is "was it sent",
/// the inner one the new (possibly empty) value.
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub species_name: Option<Option<String>>,
    pub common_name: Option<Option<String>>,
    pub point: Option<GeoPoint>,
    pub location_name: Option<Option<String>>,
    pub observation_date: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub ai_prediction: Option<Option<Value>>,
    pub ai_confidence: Option<Option<f64>>,
}

fn checked_name(errors: &mut FieldErrors, field: &str, raw: Option<&str>) -> Option<String> {
    let value = non_empty(raw)?;
    if value.chars().count() > MAX_NAME_LEN {
        errors.add(field, "Ensure this field has no more than 255 characters.");
    }
    Some(value)
}

fn coordinate(errors: &mut FieldErrors, field: &str, raw: &str, bound: f64) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && (-bound..=bound).contains(&v) => Some(v),
        Ok(_) => {
            errors.add(field, format!("Ensure this value is between -{bound} and {bound}."));
            None
        }
        Err(_) => {
            errors.add(field, "A valid number is required.");
            None
        }
    }
}
