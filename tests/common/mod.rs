#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use biodiversity_records::{
    app_state, db, routes,
    services::{anchor::MockAnchor, media_store::MediaStore},
    state::{AppState, Pagination},
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "biodiversity-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let media = tempfile::tempdir().unwrap();
        let state = app_state(
            Arc::new(pool),
            MediaStore::new(media.path()),
            Arc::new(MockAnchor),
            Pagination::default(),
        );
        let router = routes::routes::routes().with_state(state.clone());

        Self {
            router,
            state,
            _media: media,
        }
    }

    /// Create an account and return its bearer token.
    pub async fn token(&self, username: &str, staff: bool) -> String {
        let (_, token) = self
            .state
            .accounts
            .create_account(username, staff)
            .await
            .unwrap();
        token
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(get(uri, token)).await;
        (status, parse_json(&body))
    }

    /// Create a record with an image attached; returns the response JSON.
    pub async fn create_record(&self, token: &str, fields: &[(&str, &str)]) -> Value {
        let body = MultipartBody::new()
            .fields(fields)
            .file("image", "photo.jpg", "image/jpeg", b"\xff\xd8\xff fake jpeg");
        let (status, _, bytes) = self
            .send(body.request("POST", "/records", Some(token)))
            .await;
        let json = parse_json(&bytes);
        assert_eq!(status, StatusCode::CREATED, "{json}");
        json
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token).body(Body::empty()).unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

pub fn parse_json(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap()
    }
}

/// Hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn fields(self, fields: &[(&str, &str)]) -> Self {
        fields
            .iter()
            .fold(self, |body, (name, value)| body.text(name, value))
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(mut self, method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        request(method, uri, token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

/// Minimal valid fields for a record at the given point.
pub fn record_fields<'a>(
    species: &'a str,
    latitude: &'a str,
    longitude: &'a str,
    is_public: &'a str,
) -> Vec<(&'a str, &'a str)> {
    vec![
        ("species_name", species),
        ("latitude", latitude),
        ("longitude", longitude),
        ("observation_date", "2024-12-01T10:00:00Z"),
        ("is_public", is_public),
    ]
}
