//! On-disk storage for record media payloads.
//!
//! Uploads are streamed into `root/.staging/` while their size and MD5 are
//! computed, then renamed into `root/{record_id}/{kind}` once the record row
//! is accepted. A payload being replaced is kept beside the new one until
//! the metadata write settles. Staged files that never get committed are
//! removed.

use crate::models::media::{MediaKind, StoredMedia};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";
const MAX_FILENAME_LEN: usize = 255;

/// A payload written to the staging area but not yet attached to a record.
#[derive(Debug)]
pub struct StagedMedia {
    pub kind: MediaKind,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub etag: String,
    pub(crate) tmp_path: PathBuf,
}

/// A payload moved into place whose metadata row may not be written yet.
#[derive(Debug)]
pub struct CommittedMedia {
    pub media: StoredMedia,
    path: PathBuf,
    backup: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_dir(&self, record_id: Uuid) -> PathBuf {
        self.root.join(record_id.to_string())
    }

    fn payload_path(&self, record_id: Uuid, kind: MediaKind) -> PathBuf {
        self.record_dir(record_id).join(kind.as_str())
    }

    /// Stream an upload into the staging area.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5/etag and size while streaming.
    /// - Flushes and fsyncs before returning.
    ///
    /// The temporary file is removed on any error.
    pub async fn stage<S>(
        &self,
        kind: MediaKind,
        filename: Option<&str>,
        content_type: Option<String>,
        stream: S,
    ) -> io::Result<StagedMedia>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err);
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        Ok(StagedMedia {
            kind,
            filename: sanitize_filename(filename, kind),
            content_type,
            size_bytes,
            etag: format!("{:x}", digest.compute()),
            tmp_path,
        })
    }

    /// Move a staged payload to its final location.
    ///
    /// A payload of the same kind already in place is moved aside rather
    /// than overwritten; `finalize` drops it once the metadata change is
    /// durable and `rollback` puts it back otherwise.
    pub async fn commit(&self, record_id: Uuid, staged: StagedMedia) -> io::Result<CommittedMedia> {
        let dir = self.record_dir(record_id);
        if let Err(err) = fs::create_dir_all(&dir).await {
            let _ = fs::remove_file(&staged.tmp_path).await;
            return Err(err);
        }

        let dest = self.payload_path(record_id, staged.kind);
        let backup_path = dir.join(format!(".{}.bak-{}", staged.kind, Uuid::new_v4()));
        let backup = match fs::rename(&dest, &backup_path).await {
            Ok(()) => Some(backup_path),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                let _ = fs::remove_file(&staged.tmp_path).await;
                return Err(err);
            }
        };

        if let Err(err) = fs::rename(&staged.tmp_path, &dest).await {
            let _ = fs::remove_file(&staged.tmp_path).await;
            if let Some(backup) = &backup {
                if let Err(restore_err) = fs::rename(backup, &dest).await {
                    warn!(
                        "failed to restore {} after aborted commit: {}",
                        dest.display(),
                        restore_err
                    );
                }
            }
            return Err(err);
        }

        Ok(CommittedMedia {
            media: StoredMedia {
                record_id,
                kind: staged.kind.as_str().to_string(),
                filename: staged.filename,
                content_type: staged.content_type,
                size_bytes: staged.size_bytes,
                etag: staged.etag,
                uploaded_at: Utc::now(),
            },
            path: dest,
            backup,
        })
    }

    /// Drop the payloads replaced by `committed`.
    pub async fn finalize(&self, committed: Vec<CommittedMedia>) {
        for entry in committed {
            if let Some(backup) = entry.backup {
                remove_path(&backup).await;
            }
        }
    }

    /// Undo `committed`, newest first: new payloads are removed and the
    /// ones they replaced are moved back.
    pub async fn rollback(&self, committed: Vec<CommittedMedia>) {
        for entry in committed.into_iter().rev() {
            remove_path(&entry.path).await;
            if let Some(backup) = entry.backup {
                if let Err(err) = fs::rename(&backup, &entry.path).await {
                    warn!(
                        "failed to restore {} from {}: {}",
                        entry.path.display(),
                        backup.display(),
                        err
                    );
                }
            }
        }
    }

    /// Best-effort removal of staged payloads that will not be committed.
    pub async fn discard(&self, staged: Vec<StagedMedia>) {
        for media in staged {
            if let Err(err) = fs::remove_file(&media.tmp_path).await {
                if err.kind() != ErrorKind::NotFound {
                    debug!(
                        "failed to discard staged file {}: {}",
                        media.tmp_path.display(),
                        err
                    );
                }
            }
        }
    }

    pub async fn open(&self, record_id: Uuid, kind: MediaKind) -> io::Result<File> {
        File::open(self.payload_path(record_id, kind)).await
    }

    /// Remove every payload of a record. Missing directories are fine.
    pub async fn remove_record(&self, record_id: Uuid) {
        let dir = self.record_dir(record_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => debug!("removed media directory {}", dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("media directory {} already missing", dir.display());
            }
            Err(err) => debug!("failed to remove media directory {}: {}", dir.display(), err),
        }
    }
}

/// Best-effort removal of a file or directory.
async fn remove_path(path: &Path) {
    let result = match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        if err.kind() != ErrorKind::NotFound {
            debug!("failed to remove {}: {}", path.display(), err);
        }
    }
}

/// Keep only the final path component and strip control characters.
fn sanitize_filename(raw: Option<&str>, kind: MediaKind) -> String {
    let name = raw
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .map(|n| {
            n.chars()
                .filter(|c| !c.is_control())
                .take(MAX_FILENAME_LEN)
                .collect::<String>()
        })
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..");
    name.unwrap_or_else(|| kind.as_str().to_string())
}
