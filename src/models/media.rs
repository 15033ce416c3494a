//! Media attachments (image, audio, video) stored alongside a record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            _ => Err(()),
        }
    }
}

/// Metadata row for one stored payload; the bytes live on disk.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct StoredMedia {
    pub record_id: Uuid,

    /// One of `image`, `audio`, `video`.
    pub kind: String,

    /// Original filename supplied by the uploader.
    pub filename: String,

    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    pub uploaded_at: DateTime<Utc>,
}
