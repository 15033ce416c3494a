//! Parsing of list/export query parameters into a validated `RecordQuery`.
//!
//! Everything arrives as raw strings so malformed values can be reported
//! per field (or, for the radius triple, silently dropped).

use crate::{errors::FieldErrors, geo::RadiusFilter};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

/// Raw query string accepted by `GET /records` and `GET /records/export`.
#[derive(Debug, Default, Deserialize)]
pub struct RecordParams {
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub location_name: Option<String>,
    pub observation_date_min: Option<String>,
    pub observation_date_max: Option<String>,
    pub is_verified: Option<String>,
    pub contributor_id: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub format: Option<String>,
}

/// Sortable columns. Nothing outside this list can reach an ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    SpeciesName,
    ObservationDate,
    CreatedAt,
    AiConfidence,
}

impl OrderField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "species_name" => Some(OrderField::SpeciesName),
            "observation_date" => Some(OrderField::ObservationDate),
            "created_at" => Some(OrderField::CreatedAt),
            "ai_confidence" => Some(OrderField::AiConfidence),
            _ => None,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            OrderField::SpeciesName => "r.species_name_fold",
            OrderField::ObservationDate => "r.observation_date",
            OrderField::CreatedAt => "r.created_at",
            OrderField::AiConfidence => "r.ai_confidence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: OrderField,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOrdering {
    pub keys: Vec<OrderKey>,
}

impl Default for RecordOrdering {
    fn default() -> Self {
        Self {
            keys: vec![OrderKey {
                field: OrderField::ObservationDate,
                descending: true,
            }],
        }
    }
}

impl RecordOrdering {
    /// Parse a comma-separated `ordering` value such as `-observation_date,species_name`.
    ///
    /// Unknown keys are skipped; if none survive the default ordering applies.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let mut keys = Vec::new();
        for term in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (descending, name) = match term.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, term),
            };
            match OrderField::parse(name) {
                Some(field) if !keys.iter().any(|k: &OrderKey| k.field == field) => {
                    keys.push(OrderKey { field, descending })
                }
                Some(_) => {}
                None => debug!(term, "ignoring ordering key outside the allow-list"),
            }
        }

        if keys.is_empty() {
            Self::default()
        } else {
            Self { keys }
        }
    }

    /// ORDER BY clause body, always ending with an `id` tiebreaker. Missing
    /// values sort last in either direction.
    pub fn to_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .keys
            .iter()
            .map(|k| {
                let direction = if k.descending { "DESC" } else { "ASC" };
                format!("{} {} NULLS LAST", k.field.column(), direction)
            })
            .collect();
        parts.push("r.id ASC".into());
        parts.join(", ")
    }
}

/// Validated filters shared by listing and export.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub location_name: Option<String>,
    pub observed_from: Option<DateTime<Utc>>,
    pub observed_to: Option<DateTime<Utc>>,
    pub is_verified: Option<bool>,
    pub contributor_id: Option<Uuid>,
    pub search: Option<String>,
    pub ordering: RecordOrdering,
    pub radius: Option<RadiusFilter>,
}

impl RecordQuery {
    pub fn from_params(params: &RecordParams) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();

        let observed_from = parse_field(
            &mut errors,
            "observation_date_min",
            params.observation_date_min.as_deref(),
            parse_timestamp,
            "Enter a valid date/time.",
        );
        let observed_to = parse_field(
            &mut errors,
            "observation_date_max",
            params.observation_date_max.as_deref(),
            parse_timestamp,
            "Enter a valid date/time.",
        );
        let is_verified = parse_field(
            &mut errors,
            "is_verified",
            params.is_verified.as_deref(),
            parse_bool,
            "Enter a valid boolean.",
        );
        let contributor_id = parse_field(
            &mut errors,
            "contributor_id",
            params.contributor_id.as_deref(),
            |v| Uuid::parse_str(v).ok(),
            "Enter a valid UUID.",
        );

        let query = Self {
            species_name: non_empty(params.species_name.as_deref()),
            common_name: non_empty(params.common_name.as_deref()),
            location_name: non_empty(params.location_name.as_deref()),
            observed_from,
            observed_to,
            is_verified,
            contributor_id,
            search: non_empty(params.search.as_deref()),
            ordering: RecordOrdering::parse(params.ordering.as_deref()),
            radius: RadiusFilter::from_params(
                params.lat.as_deref(),
                params.lng.as_deref(),
                params.radius.as_deref(),
            ),
        };

        errors.into_result(query)
    }
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn from_params(
        params: &RecordParams,
        default_size: u32,
        max_size: u32,
    ) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let page = parse_field(
            &mut errors,
            "page",
            params.page.as_deref(),
            |v| v.parse::<u32>().ok().filter(|p| *p >= 1),
            "Enter a positive page number.",
        )
        .unwrap_or(1);
        let page_size = parse_field(
            &mut errors,
            "page_size",
            params.page_size.as_deref(),
            |v| v.parse::<u32>().ok(),
            "Enter a whole number.",
        )
        .unwrap_or(default_size)
        .clamp(1, max_size.max(1));

        errors.into_result(Self { page, page_size })
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

/// Accept RFC 3339 plus the naive forms HTML forms tend to send (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Lowercase with Unicode rules; text filters and name ordering compare
/// folded values so `Águila` matches `águila`.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Trim and drop empty values.
pub fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_field<T>(
    errors: &mut FieldErrors,
    field: &str,
    raw: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
    msg: &str,
) -> Option<T> {
    let raw = non_empty(raw)?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        errors.add(field, msg);
    }
    parsed
}
