//! HTTP handlers for observation records.
//! Reads are scoped by the requester; writes require an account and are
//! delegated to `RecordService`, which enforces ownership.

use crate::{
    auth::Requester,
    errors::AppError,
    handlers::multipart::read_record_form,
    models::{
        media::{MediaKind, StoredMedia},
        page::Page,
        record::{Record, RecordView, VerificationOutcome},
    },
    services::{
        export::{EXPORT_LIMIT, ExportFormat, ExportRow},
        query::{PageRequest, RecordParams, RecordQuery},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State, multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::error;
use uuid::Uuid;

/// `GET /records`: filtered, ordered and paginated list.
pub async fn list_records(
    State(state): State<AppState>,
    requester: Requester,
    params: Result<Query<RecordParams>, QueryRejection>,
) -> Result<Json<Page<RecordView>>, AppError> {
    let params = query_params(params)?;
    let query = RecordQuery::from_params(&params)?;
    let page = PageRequest::from_params(
        &params,
        state.pagination.default_page_size,
        state.pagination.max_page_size,
    )?;

    let (count, records) = state
        .records
        .list(requester.scope(), &query, page.limit(), page.offset())
        .await?;
    let results = to_views(&state, records).await?;

    Ok(Json(Page::new(count, page.page, page.page_size, results)))
}

/// `POST /records`: multipart create, owned by the requester.
pub async fn create_record(
    State(state): State<AppState>,
    requester: Requester,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let account = requester.require_account()?;
    let form = read_record_form(multipart, &state.records.media).await?;
    let record = state.records.create(account, form).await?;
    let view = to_view(&state, record).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /records/{id}`
pub async fn get_record(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Json<RecordView>, AppError> {
    let id = parse_record_id(&id)?;
    let record = state.records.get(requester.scope(), id).await?;
    Ok(Json(to_view(&state, record).await?))
}

/// `PUT /records/{id}`: replace; location and date are required.
pub async fn replace_record(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecordView>, AppError> {
    update(state, requester, id, multipart, true).await
}

/// `PATCH /records/{id}`: partial update.
pub async fn patch_record(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecordView>, AppError> {
    update(state, requester, id, multipart, false).await
}

async fn update(
    state: AppState,
    requester: Requester,
    id: String,
    multipart: Result<Multipart, MultipartRejection>,
    full: bool,
) -> Result<Json<RecordView>, AppError> {
    let account = requester.require_account()?;
    let id = parse_record_id(&id)?;
    let form = read_record_form(multipart, &state.records.media).await?;
    let record = state.records.update(account, id, form, full).await?;
    Ok(Json(to_view(&state, record).await?))
}

/// `DELETE /records/{id}`
pub async fn delete_record(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let account = requester.require_account()?;
    let id = parse_record_id(&id)?;
    state.records.delete(account, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /records/export?format=csv|json`: same filters as the list, no
/// pagination, capped at `EXPORT_LIMIT` rows.
pub async fn export_records(
    State(state): State<AppState>,
    requester: Requester,
    params: Result<Query<RecordParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let params = query_params(params)?;
    let query = RecordQuery::from_params(&params)?;
    let format = ExportFormat::parse(params.format.as_deref());

    let records = state
        .records
        .export(requester.scope(), &query, EXPORT_LIMIT)
        .await?;
    let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
    let body = format.render(&rows).map_err(|err| {
        error!("failed to render export: {}", err);
        AppError::internal("failed to render export")
    })?;

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static(format.content_disposition()),
    );
    Ok(response)
}

/// `POST /records/{id}/validate`: one-way verification by owner or staff.
pub async fn validate_record(
    State(state): State<AppState>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Json<VerificationOutcome>, AppError> {
    let account = requester.require_account()?;
    let id = parse_record_id(&id)?;
    let outcome = state.records.verify(account, id).await?;
    Ok(Json(outcome))
}

/// `GET /records/{id}/media/{kind}`: stream a stored payload.
pub async fn get_media(
    State(state): State<AppState>,
    requester: Requester,
    Path((id, kind)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let id = parse_record_id(&id)?;
    let kind = kind
        .parse::<MediaKind>()
        .map_err(|_| AppError::not_found("Not found."))?;

    let (meta, file) = state
        .records
        .media_reader(requester.scope(), id, kind)
        .await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    set_media_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// Query strings the extractor cannot decode get the JSON error envelope.
fn query_params(
    params: Result<Query<RecordParams>, QueryRejection>,
) -> Result<RecordParams, AppError> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// Malformed ids cannot name an existing record.
fn parse_record_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("Not found."))
}

async fn to_view(state: &AppState, record: Record) -> Result<RecordView, AppError> {
    let mut views = to_views(state, vec![record]).await?;
    views
        .pop()
        .ok_or_else(|| AppError::internal("record view missing"))
}

async fn to_views(state: &AppState, records: Vec<Record>) -> Result<Vec<RecordView>, AppError> {
    let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
    let media = state.records.media_kinds(&ids).await?;

    Ok(records
        .into_iter()
        .map(|record| {
            let kinds = media.get(&record.id).map(Vec::as_slice).unwrap_or(&[]);
            RecordView::new(record, kinds)
        })
        .collect())
}

fn set_media_headers(headers: &mut HeaderMap, meta: &StoredMedia) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes.max(0)));

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    let disposition = format!("inline; filename=\"{}\"", meta.filename.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Ok(value) = HeaderValue::from_str(&meta.uploaded_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
