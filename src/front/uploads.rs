use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use super::{AppMessage, AppState};
use crate::{
    error::Error,
    models::{Attachment, NewAttachment},
    storage::{DownloadTicket, UploadTicket, DEFAULT_DOWNLOAD_EXPIRES_SECS},
};

const DEFAULT_MIME: &str = "application/octet-stream";

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/sign", post(sign))
        .route("/complete", post(complete))
        .route("/url", get(url))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SignRequest {
    mime: Option<String>,
    size: Option<u64>,
}

#[axum::debug_handler]
async fn sign(
    State(s): State<AppState>,
    body: Result<Json<SignRequest>, JsonRejection>,
) -> Result<Json<UploadTicket>, AppMessage> {
    let Json(body) = body?;
    let mime = body
        .mime
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MIME.to_string());
    let size = body.size.unwrap_or_else(|| s.storage.max_upload_bytes());
    let ticket = s.storage.sign_upload(&mime, size, Utc::now())?;
    log::info!("issued upload url for {} ({})", ticket.key, mime);
    Ok(Json(ticket))
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct CompleteRequest {
    entry_id: Option<i64>,
    key: Option<String>,
    filename: Option<String>,
    mime: Option<String>,
    size: Option<i64>,
    pages: Option<i32>,
}

/// Records an object the client has finished uploading. The key is stored as
/// given; the bucket is not consulted.
#[axum::debug_handler]
async fn complete(
    State(s): State<AppState>,
    body: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<Attachment>, AppMessage> {
    let Json(body) = body?;
    let entry_id = body
        .entry_id
        .filter(|id| *id != 0)
        .ok_or(Error::MissingField("entryId is required"))?;
    let storage_key = body
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or(Error::MissingField("key is required"))?;
    let att = s
        .ledger
        .attach(NewAttachment {
            entry_id,
            storage_key,
            filename: body.filename.unwrap_or_default(),
            mime: body.mime.unwrap_or_else(|| DEFAULT_MIME.to_string()),
            size: body.size.unwrap_or(0),
            pages: body.pages.unwrap_or(0),
        })
        .await?;
    Ok(Json(att))
}

#[derive(Deserialize)]
struct UrlQuery {
    key: Option<String>,
    expires: Option<u64>,
}

#[axum::debug_handler]
async fn url(
    State(s): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> Result<Json<DownloadTicket>, AppMessage> {
    let key = q
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or(Error::MissingField("key is required"))?;
    let expires = q.expires.unwrap_or(DEFAULT_DOWNLOAD_EXPIRES_SECS);
    Ok(Json(s.storage.sign_download(&key, expires, Utc::now())?))
}
