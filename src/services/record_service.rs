//! RecordService: record persistence and the scoped query pipeline.
//!
//! Metadata lives in SQLite; media payloads are delegated to `MediaStore`.
//! Every read is narrowed by an `AccessScope` before any caller-supplied
//! filter is applied, and every write checks ownership first.

use crate::{
    errors::FieldErrors,
    models::{
        account::Account,
        media::{MediaKind, StoredMedia},
        record::{Record, VerificationOutcome},
        species::SpeciesSummary,
    },
    services::{
        anchor::Anchor,
        media_store::{CommittedMedia, MediaStore, StagedMedia},
        query::{RecordQuery, fold_case},
        record_form::RecordForm,
        species::aggregate_species,
    },
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite, types::Json};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    sync::Arc,
};
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "r.id, r.contributor_id, a.username AS contributor_username, \
     r.species_name, r.common_name, r.latitude, r.longitude, r.location_name, \
     r.observation_date, r.notes, r.is_public, r.ai_prediction, r.ai_confidence, \
     r.is_verified, r.verification_hash, r.created_at, r.updated_at";

const RECORD_FROM: &str = " FROM records r JOIN accounts a ON a.id = r.contributor_id WHERE 1 = 1";

const SEARCH_COLUMNS: [&str; 4] = [
    "r.species_name_fold",
    "r.common_name_fold",
    "r.notes_fold",
    "r.location_name_fold",
];

/// Which records a requester may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// Anonymous: public records only.
    Public,
    /// Regular account: public records plus its own.
    PublicOrOwned(Uuid),
    /// Staff: everything.
    All,
}

impl AccessScope {
    pub fn for_account(account: &Account) -> Self {
        if account.is_staff {
            AccessScope::All
        } else {
            AccessScope::PublicOrOwned(account.id)
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record `{0}` not found")]
    NotFound(Uuid),
    #[error("no {kind} stored for record `{id}`")]
    MediaNotFound { id: Uuid, kind: MediaKind },
    #[error("not permitted to modify record `{0}`")]
    Forbidden(Uuid),
    #[error("invalid record: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Clone)]
pub struct RecordService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Payload storage for attached media.
    pub media: MediaStore,

    anchor: Arc<dyn Anchor>,
}

impl RecordService {
    pub fn new(db: Arc<SqlitePool>, media: MediaStore, anchor: Arc<dyn Anchor>) -> Self {
        Self { db, media, anchor }
    }

    /// One page of the scoped, filtered and ordered record set, plus the
    /// total number of matches.
    ///
    /// Without a radius filter paging happens in SQL. With one, SQL narrows
    /// candidates to a bounding box and the exact great-circle test runs
    /// here before slicing.
    pub async fn list(
        &self,
        scope: AccessScope,
        query: &RecordQuery,
        limit: usize,
        offset: usize,
    ) -> RecordResult<(u64, Vec<Record>)> {
        if let Some(radius) = &query.radius {
            let mut rows = self.fetch_matching(scope, query, None).await?;
            rows.retain(|r| radius.contains(&r.point()));
            let total = rows.len() as u64;
            let page = rows.into_iter().skip(offset).take(limit).collect();
            return Ok((total, page));
        }

        let total = self.count_matching(scope, query).await?;
        let rows = self
            .fetch_matching(scope, query, Some((limit, offset)))
            .await?;
        Ok((total, rows))
    }

    /// At most `cap` matching records, in query order.
    pub async fn export(
        &self,
        scope: AccessScope,
        query: &RecordQuery,
        cap: usize,
    ) -> RecordResult<Vec<Record>> {
        match &query.radius {
            Some(radius) => {
                let mut rows = self.fetch_matching(scope, query, None).await?;
                rows.retain(|r| radius.contains(&r.point()));
                rows.truncate(cap);
                Ok(rows)
            }
            None => self.fetch_matching(scope, query, Some((cap, 0))).await,
        }
    }

    /// Fetch a single record visible within `scope`.
    pub async fn get(&self, scope: AccessScope, id: Uuid) -> RecordResult<Record> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {RECORD_COLUMNS}{RECORD_FROM}"));
        builder.push(" AND r.id = ");
        builder.push_bind(id);
        push_scope(&mut builder, scope);

        builder
            .build_query_as::<Record>()
            .fetch_optional(&*self.db)
            .await?
            .ok_or(RecordError::NotFound(id))
    }

    /// Stored media kinds for each of `ids`.
    pub async fn media_kinds(&self, ids: &[Uuid]) -> RecordResult<HashMap<Uuid, Vec<MediaKind>>> {
        let mut out: HashMap<Uuid, Vec<MediaKind>> = HashMap::new();
        if ids.is_empty() {
            return Ok(out);
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT record_id, kind FROM record_media WHERE record_id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(Uuid, String)> = builder.build_query_as().fetch_all(&*self.db).await?;
        for (record_id, kind) in rows {
            match kind.parse::<MediaKind>() {
                Ok(kind) => out.entry(record_id).or_default().push(kind),
                Err(_) => warn!(%record_id, kind = %kind, "skipping unknown media kind"),
            }
        }
        for kinds in out.values_mut() {
            kinds.sort();
        }
        Ok(out)
    }

    /// Open a stored payload for streaming, subject to read visibility.
    pub async fn media_reader(
        &self,
        scope: AccessScope,
        id: Uuid,
        kind: MediaKind,
    ) -> RecordResult<(StoredMedia, File)> {
        self.get(scope, id).await?;

        let meta = sqlx::query_as::<_, StoredMedia>(
            "SELECT record_id, kind, filename, content_type, size_bytes, etag, uploaded_at
             FROM record_media WHERE record_id = ? AND kind = ?",
        )
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&*self.db)
        .await?
        .ok_or(RecordError::MediaNotFound { id, kind })?;

        let file = self.media.open(id, kind).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                RecordError::MediaNotFound { id, kind }
            } else {
                RecordError::Io(err)
            }
        })?;

        Ok((meta, file))
    }

    /// Create a record owned by `owner` from a submitted form.
    ///
    /// - Validates fields; at least one media file is mandatory.
    /// - Moves staged media into the record's directory.
    /// - Inserts the record and media rows in one transaction.
    ///
    /// Staged or committed payloads are removed if any step fails.
    pub async fn create(&self, owner: &Account, form: RecordForm) -> RecordResult<Record> {
        let new = match form.to_new_record() {
            Ok(new) => new,
            Err(errors) => {
                self.media.discard(form.media).await;
                return Err(RecordError::Validation(errors));
            }
        };

        let id = Uuid::new_v4();
        let committed = match self.commit_all(id, form.media).await {
            Ok(committed) => committed,
            Err(err) => {
                self.media.remove_record(id).await;
                return Err(err.into());
            }
        };

        let now = Utc::now();
        let insert = async {
            let mut tx = self.db.begin().await?;
            sqlx::query(
                r#"
                INSERT INTO records (
                    id, contributor_id, species_name, common_name, latitude, longitude,
                    location_name, observation_date, notes, is_public, ai_prediction,
                    ai_confidence, is_verified, verification_hash, created_at, updated_at,
                    species_name_fold, common_name_fold, location_name_fold, notes_fold
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(owner.id)
            .bind(&new.species_name)
            .bind(&new.common_name)
            .bind(new.point.latitude)
            .bind(new.point.longitude)
            .bind(&new.location_name)
            .bind(new.observation_date)
            .bind(&new.notes)
            .bind(new.is_public)
            .bind(new.ai_prediction.clone().map(Json))
            .bind(new.ai_confidence)
            .bind(now)
            .bind(now)
            .bind(new.species_name.as_deref().map(fold_case))
            .bind(new.common_name.as_deref().map(fold_case))
            .bind(new.location_name.as_deref().map(fold_case))
            .bind(new.notes.as_deref().map(fold_case))
            .execute(&mut *tx)
            .await?;
            for entry in &committed {
                upsert_media(&mut tx, &entry.media).await?;
            }
            tx.commit().await
        };

        if let Err(err) = insert.await {
            self.media.remove_record(id).await;
            return Err(RecordError::Sqlx(err));
        }

        let media = committed.len();
        self.media.finalize(committed).await;
        info!(
            record_id = %id,
            contributor = %owner.username,
            media,
            "record created"
        );
        self.get(AccessScope::All, id).await
    }

    /// Apply an update from the owner or a staff account.
    ///
    /// `full` selects replace semantics (PUT) over partial ones (PATCH).
    /// Owner and verification state are never touched here.
    pub async fn update(
        &self,
        account: &Account,
        id: Uuid,
        form: RecordForm,
        full: bool,
    ) -> RecordResult<Record> {
        if let Err(err) = self.fetch_for_write(account, id).await {
            self.media.discard(form.media).await;
            return Err(err);
        }
        let changes = match form.to_changes(full) {
            Ok(changes) => changes,
            Err(errors) => {
                self.media.discard(form.media).await;
                return Err(RecordError::Validation(errors));
            }
        };

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE records SET updated_at = ");
        builder.push_bind(Utc::now());
        if let Some(value) = changes.species_name {
            builder
                .push(", species_name_fold = ")
                .push_bind(value.as_deref().map(fold_case));
            builder.push(", species_name = ").push_bind(value);
        }
        if let Some(value) = changes.common_name {
            builder
                .push(", common_name_fold = ")
                .push_bind(value.as_deref().map(fold_case));
            builder.push(", common_name = ").push_bind(value);
        }
        if let Some(point) = changes.point {
            builder.push(", latitude = ").push_bind(point.latitude);
            builder.push(", longitude = ").push_bind(point.longitude);
        }
        if let Some(value) = changes.location_name {
            builder
                .push(", location_name_fold = ")
                .push_bind(value.as_deref().map(fold_case));
            builder.push(", location_name = ").push_bind(value);
        }
        if let Some(value) = changes.observation_date {
            builder.push(", observation_date = ").push_bind(value);
        }
        if let Some(value) = changes.notes {
            builder
                .push(", notes_fold = ")
                .push_bind(value.as_deref().map(fold_case));
            builder.push(", notes = ").push_bind(value);
        }
        if let Some(value) = changes.is_public {
            builder.push(", is_public = ").push_bind(value);
        }
        if let Some(value) = changes.ai_prediction {
            builder.push(", ai_prediction = ").push_bind(value.map(Json));
        }
        if let Some(value) = changes.ai_confidence {
            builder.push(", ai_confidence = ").push_bind(value);
        }
        builder.push(" WHERE id = ").push_bind(id);

        // Replaced payloads are kept aside until the rows are durable.
        let committed = self.commit_all(id, form.media).await?;
        let write = async {
            let mut tx = self.db.begin().await?;
            for entry in &committed {
                upsert_media(&mut tx, &entry.media).await?;
            }
            builder.build().execute(&mut *tx).await?;
            tx.commit().await
        };
        if let Err(err) = write.await {
            warn!(record_id = %id, "update failed, restoring previous media: {}", err);
            self.media.rollback(committed).await;
            return Err(RecordError::Sqlx(err));
        }
        self.media.finalize(committed).await;

        info!(record_id = %id, by = %account.username, "record updated");
        self.get(AccessScope::All, id).await
    }

    /// Delete a record and, best-effort, its media directory.
    pub async fn delete(&self, account: &Account, id: Uuid) -> RecordResult<()> {
        self.fetch_for_write(account, id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM record_media WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(RecordError::NotFound(id));
        }

        self.media.remove_record(id).await;
        info!(record_id = %id, by = %account.username, "record deleted");
        Ok(())
    }

    /// One-way verification.
    ///
    /// The flag and hash are written by a single conditional UPDATE, so two
    /// racing calls cannot both succeed with different hashes. The loser
    /// reports the winner's hash.
    pub async fn verify(&self, account: &Account, id: Uuid) -> RecordResult<VerificationOutcome> {
        let record = self.fetch_for_write(account, id).await?;
        if record.is_verified {
            return Ok(VerificationOutcome::already_verified(record.verification_hash));
        }

        let hash = self.anchor.anchor(id);
        let result = sqlx::query(
            "UPDATE records SET is_verified = 1, verification_hash = ?, updated_at = ?
             WHERE id = ? AND is_verified = 0",
        )
        .bind(&hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT verification_hash FROM records WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&*self.db)
                    .await?
                    .ok_or(RecordError::NotFound(id))?;
            debug!(record_id = %id, "verification lost race to a concurrent call");
            return Ok(VerificationOutcome::already_verified(existing));
        }

        info!(record_id = %id, by = %account.username, "record verified");
        Ok(VerificationOutcome::verified(hash))
    }

    /// Distinct species across the records visible within `scope`.
    pub async fn species(&self, scope: AccessScope) -> RecordResult<Vec<SpeciesSummary>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT r.species_name, r.common_name FROM records r \
             WHERE r.species_name IS NOT NULL AND TRIM(r.species_name) <> ''",
        );
        push_scope(&mut builder, scope);
        builder.push(" ORDER BY r.created_at ASC, r.id ASC");

        let rows: Vec<(String, Option<String>)> =
            builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(aggregate_species(rows))
    }

    /// Visible to `account` and owned by it (or `account` is staff).
    async fn fetch_for_write(&self, account: &Account, id: Uuid) -> RecordResult<Record> {
        let record = self.get(AccessScope::for_account(account), id).await?;
        if record.contributor_id != account.id && !account.is_staff {
            return Err(RecordError::Forbidden(id));
        }
        Ok(record)
    }

    async fn count_matching(&self, scope: AccessScope, query: &RecordQuery) -> RecordResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*){RECORD_FROM}"));
        push_scope(&mut builder, scope);
        push_filters(&mut builder, query);
        let count: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_matching(
        &self,
        scope: AccessScope,
        query: &RecordQuery,
        window: Option<(usize, usize)>,
    ) -> RecordResult<Vec<Record>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {RECORD_COLUMNS}{RECORD_FROM}"));
        push_scope(&mut builder, scope);
        push_filters(&mut builder, query);
        builder.push(" ORDER BY ");
        builder.push(query.ordering.to_sql());
        if let Some((limit, offset)) = window {
            builder.push(" LIMIT ").push_bind(limit as i64);
            builder.push(" OFFSET ").push_bind(offset as i64);
        }

        Ok(builder
            .build_query_as::<Record>()
            .fetch_all(&*self.db)
            .await?)
    }

    /// Commit staged payloads in order. On failure the ones already in
    /// place are rolled back and the rest are discarded.
    async fn commit_all(
        &self,
        record_id: Uuid,
        staged: Vec<StagedMedia>,
    ) -> io::Result<Vec<CommittedMedia>> {
        let mut committed = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter();
        while let Some(media) = pending.next() {
            match self.media.commit(record_id, media).await {
                Ok(entry) => committed.push(entry),
                Err(err) => {
                    self.media.rollback(committed).await;
                    self.media.discard(pending.collect()).await;
                    return Err(err);
                }
            }
        }
        Ok(committed)
    }
}

async fn upsert_media(conn: &mut SqliteConnection, media: &StoredMedia) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO record_media (
            record_id, kind, filename, content_type, size_bytes, etag, uploaded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(record_id, kind) DO UPDATE SET
            filename = excluded.filename,
            content_type = excluded.content_type,
            size_bytes = excluded.size_bytes,
            etag = excluded.etag,
            uploaded_at = excluded.uploaded_at
        "#,
    )
    .bind(media.record_id)
    .bind(&media.kind)
    .bind(&media.filename)
    .bind(&media.content_type)
    .bind(media.size_bytes)
    .bind(&media.etag)
    .bind(media.uploaded_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: AccessScope) {
    match scope {
        AccessScope::Public => {
            builder.push(" AND r.is_public = 1");
        }
        AccessScope::PublicOrOwned(account_id) => {
            builder.push(" AND (r.is_public = 1 OR r.contributor_id = ");
            builder.push_bind(account_id);
            builder.push(")");
        }
        AccessScope::All => {}
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &RecordQuery) {
    for (column, value) in [
        ("r.species_name_fold", &query.species_name),
        ("r.common_name_fold", &query.common_name),
        ("r.location_name_fold", &query.location_name),
    ] {
        if let Some(value) = value {
            push_like(builder, column, like_pattern(&fold_case(value)));
        }
    }
    if let Some(from) = query.observed_from {
        builder.push(" AND r.observation_date >= ").push_bind(from);
    }
    if let Some(to) = query.observed_to {
        builder.push(" AND r.observation_date <= ").push_bind(to);
    }
    if let Some(verified) = query.is_verified {
        builder.push(" AND r.is_verified = ").push_bind(verified);
    }
    if let Some(contributor) = query.contributor_id {
        builder.push(" AND r.contributor_id = ").push_bind(contributor);
    }
    if let Some(term) = &query.search {
        let pattern = like_pattern(&fold_case(term));
        builder.push(" AND (1 = 0");
        for column in SEARCH_COLUMNS {
            builder.push(" OR");
            push_like_clause(builder, column, pattern.clone());
        }
        builder.push(")");
    }
    if let Some(radius) = &query.radius {
        let bbox = radius.bounding_box();
        builder
            .push(" AND r.latitude BETWEEN ")
            .push_bind(bbox.min_latitude)
            .push(" AND ")
            .push_bind(bbox.max_latitude);
        if let Some((min_lng, max_lng)) = bbox.longitude {
            builder
                .push(" AND r.longitude BETWEEN ")
                .push_bind(min_lng)
                .push(" AND ")
                .push_bind(max_lng);
        }
    }
}

fn push_like(builder: &mut QueryBuilder<'_, Sqlite>, column: &'static str, pattern: String) {
    builder.push(" AND");
    push_like_clause(builder, column, pattern);
}

fn push_like_clause(builder: &mut QueryBuilder<'_, Sqlite>, column: &'static str, pattern: String) {
    builder
        .push(format!(" {column} LIKE "))
        .push_bind(pattern)
        .push(" ESCAPE '\\'");
}

/// `%value%` with LIKE metacharacters escaped by `\`.
fn like_pattern(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
