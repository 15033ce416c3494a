//! Multipart decoding for record create/update requests.
//!
//! Text parts are collected into a `RecordForm`; `image`, `audio` and
//! `video` parts are streamed straight into the media staging area.

use crate::{
    errors::AppError,
    models::media::MediaKind,
    services::{media_store::MediaStore, record_form::RecordForm},
};
use axum::extract::{
    Multipart,
    multipart::{MultipartError, MultipartRejection},
};
use futures::StreamExt;
use std::io::{self, ErrorKind};
use tracing::{debug, error};

/// Decode a multipart body into a form. Staged media is discarded if the
/// body turns out to be malformed half way through.
pub async fn read_record_form(
    multipart: Result<Multipart, MultipartRejection>,
    media: &MediaStore,
) -> Result<RecordForm, AppError> {
    let mut multipart = multipart.map_err(|rejection| {
        AppError::bad_request(format!("Expected a multipart form body: {}", rejection.body_text()))
    })?;

    let mut form = RecordForm::default();
    match collect_fields(&mut multipart, media, &mut form).await {
        Ok(()) => Ok(form),
        Err(err) => {
            media.discard(std::mem::take(&mut form.media)).await;
            Err(err)
        }
    }
}

async fn collect_fields(
    multipart: &mut Multipart,
    media: &MediaStore,
    form: &mut RecordForm,
) -> Result<(), AppError> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            debug!("skipping unnamed multipart field");
            continue;
        };

        match name.parse::<MediaKind>() {
            Ok(kind) => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let stream =
                    field.map(|chunk| chunk.map_err(|err| io::Error::new(ErrorKind::InvalidData, err)));

                let staged = media
                    .stage(kind, filename.as_deref(), content_type, stream)
                    .await
                    .map_err(|err| {
                        if err.kind() == ErrorKind::InvalidData {
                            AppError::bad_request(format!("Failed to read {} upload: {}", kind, err))
                        } else {
                            error!("failed to stage {} upload: {}", kind, err);
                            AppError::internal("media storage error")
                        }
                    })?;
                form.media.push(staged);
            }
            Err(()) => {
                let value = field.text().await.map_err(malformed)?;
                form.set_text(&name, value);
            }
        }
    }
    Ok(())
}

fn malformed(err: MultipartError) -> AppError {
    AppError::bad_request(format!("Malformed multipart body: {}", err.body_text()))
}
