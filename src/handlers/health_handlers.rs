//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks DB connectivity and media dir I/O

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const SENTINEL_BYTES: &[u8] = b"readyz";

/// `GET /healthz`
///
/// Liveness check. Always 200 with a small JSON body; never touches I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// Readiness check that:
/// 1. Runs a lightweight query against SQLite (`SELECT 1`).
/// 2. Writes, reads back and deletes a sentinel file inside the media root.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", check_sqlite(&state.records.db).await);
    checks.insert("media", check_media_dir(state.records.media.root()).await);

    let ready = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_sqlite(db: &SqlitePool) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::fail(format!("error: {}", e)),
    }
}

async fn check_media_dir(root: &Path) -> CheckStatus {
    let sentinel = root.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&sentinel, SENTINEL_BYTES).await {
        return CheckStatus::fail(format!("could not write sentinel file: {}", e));
    }

    let status = match fs::read(&sentinel).await {
        Ok(bytes) if bytes == SENTINEL_BYTES => CheckStatus::pass(),
        Ok(_) => CheckStatus::fail("sentinel file content mismatch".to_string()),
        Err(e) => CheckStatus::fail(format!("could not read sentinel file: {}", e)),
    };

    match fs::remove_file(&sentinel).await {
        Err(e) if status.ok => CheckStatus {
            ok: true,
            error: Some(format!("could not remove sentinel file: {}", e)),
        },
        _ => status,
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self { ok: true, error: None }
    }

    fn fail(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
