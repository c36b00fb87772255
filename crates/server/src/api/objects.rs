//! Signed object transfer.
//!
//! Upload and download URLs handed out by the coordinator point here. The
//! signature in the query string is the only credential; these routes sit
//! outside the API authentication layer.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use reelpress_core::{
    storage::{keys, UrlMethod},
    FsObjectStore, StorageError,
};

use super::error::ApiError;
use crate::metrics::{OBJECT_BYTES, OBJECT_REJECTIONS};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

fn gateway(state: &AppState) -> Result<&FsObjectStore, ApiError> {
    state
        .object_gateway()
        .ok_or_else(|| ApiError::not_found("object routes are not served by this instance"))
}

fn verify(
    store: &FsObjectStore,
    method: UrlMethod,
    key: &str,
    params: &SignedParams,
) -> Result<(), ApiError> {
    let (Some(expires), Some(signature)) = (params.expires, params.signature.as_deref()) else {
        OBJECT_REJECTIONS.with_label_values(&["signature"]).inc();
        return Err(ApiError::forbidden("missing signature"));
    };

    store
        .signer()
        .verify(method, key, expires, signature, Utc::now())
        .map_err(|e| {
            let reason = match e {
                StorageError::Expired(_) => "expired",
                _ => "signature",
            };
            OBJECT_REJECTIONS.with_label_values(&[reason]).inc();
            ApiError::from(e)
        })
}

/// Stream a request body into the object store.
///
/// Only source keys accept uploads, up to the configured maximum file size.
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<SignedParams>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let store = gateway(&state)?;
    verify(store, UrlMethod::Put, &key, &params)?;
    if keys::parse_source_key(&key).is_none() {
        return Err(ApiError::forbidden("uploads are limited to source objects"));
    }

    let max_size = state.config().limits.max_file_size_bytes;
    let mut writer = store.writer(&key).await?;
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                writer.abort().await;
                warn!("Upload of {} interrupted: {}", key, e);
                return Err(ApiError::validation(format!("upload interrupted: {}", e)));
            }
        };

        if writer.bytes_written() + chunk.len() as u64 > max_size {
            writer.abort().await;
            OBJECT_REJECTIONS.with_label_values(&["too_large"]).inc();
            return Err(ApiError::payload_too_large(format!(
                "object exceeds {} bytes",
                max_size
            )));
        }

        if let Err(e) = writer.write_chunk(&chunk).await {
            writer.abort().await;
            return Err(e.into());
        }
    }

    let size = writer.finish().await?;
    OBJECT_BYTES.with_label_values(&["upload"]).inc_by(size);
    debug!("Stored {} ({} bytes)", key, size);
    Ok(StatusCode::OK)
}

/// Stream an object back to the client.
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ApiError> {
    let store = gateway(&state)?;
    verify(store, UrlMethod::Get, &key, &params)?;

    let (size, stream) = store.read_stream(&key).await?;
    let stream = stream.inspect_ok(|chunk| {
        OBJECT_BYTES
            .with_label_values(&["download"])
            .inc_by(chunk.len() as u64);
    });

    let filename = key.rsplit('/').next().unwrap_or("object");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
