//! Bulk export of records as CSV or JSON.
//!
//! Both formats are driven by `EXPORT_FIELDS` and `ExportRow`, so the header
//! row, the CSV cells and the JSON keys cannot drift apart.

use crate::models::record::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on exported rows.
pub const EXPORT_LIMIT: usize = 10_000;

pub const EXPORT_FIELDS: [&str; 12] = [
    "id",
    "contributor",
    "species_name",
    "common_name",
    "latitude",
    "longitude",
    "location_name",
    "observation_date",
    "notes",
    "ai_confidence",
    "is_verified",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// `json` (any case) selects JSON; anything else falls back to CSV.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn content_disposition(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "attachment; filename=\"biodiversity_export.csv\"",
            ExportFormat::Json => "attachment; filename=\"biodiversity_export.json\"",
        }
    }

    pub fn render(&self, rows: &[ExportRow]) -> serde_json::Result<String> {
        match self {
            ExportFormat::Csv => Ok(render_csv(rows)),
            ExportFormat::Json => serde_json::to_string_pretty(rows),
        }
    }
}

/// The exported projection of a record. Field order matches `EXPORT_FIELDS`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub id: Uuid,
    pub contributor: String,
    pub species_name: Option<String>,
    pub common_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: Option<String>,
    pub observation_date: String,
    pub notes: Option<String>,
    pub ai_confidence: Option<f64>,
    pub is_verified: bool,
    pub created_at: String,
}

impl From<&Record> for ExportRow {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            contributor: record.contributor_username.clone(),
            species_name: record.species_name.clone(),
            common_name: record.common_name.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            location_name: record.location_name.clone(),
            observation_date: format_timestamp(&record.observation_date),
            notes: record.notes.clone(),
            ai_confidence: record.ai_confidence,
            is_verified: record.is_verified,
            created_at: format_timestamp(&record.created_at),
        }
    }
}

impl ExportRow {
    fn csv_cells(&self) -> [String; 12] {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        [
            self.id.to_string(),
            self.contributor.clone(),
            text(&self.species_name),
            text(&self.common_name),
            self.latitude.to_string(),
            self.longitude.to_string(),
            text(&self.location_name),
            self.observation_date.clone(),
            text(&self.notes),
            self.ai_confidence.map(|c| c.to_string()).unwrap_or_default(),
            self.is_verified.to_string(),
            self.created_at.clone(),
        ]
    }
}

/// ISO-8601 in UTC with microsecond precision, e.g. `2024-12-01T10:00:00.000000Z`.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn render_csv(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    push_csv_line(&mut out, EXPORT_FIELDS.iter().copied());
    for row in rows {
        let cells = row.csv_cells();
        push_csv_line(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn push_csv_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_escape(cell));
    }
    out.push_str("\r\n");
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
