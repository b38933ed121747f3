use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Query, State},
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use super::{auth, AppMessage, AppState};
use crate::{
    error::Error,
    import,
    ledger::{BatchOutcome, EntryRequest, FilterQuery},
    models::{Entry, EntryDetail, Summary},
};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub fn new_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/batch", post(batch))
        .route("/import", post(import_csv))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_key));

    Router::new()
        .route("/", get(list).post(create))
        .route("/summary", get(summary))
        .merge(protected)
}

#[axum::debug_handler]
async fn create(
    State(s): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Entry>, AppMessage> {
    let Json(body) = body?;
    let req: EntryRequest =
        serde_json::from_value(body).map_err(|err| Error::MalformedItem(err.to_string()))?;
    let header_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.trim().is_empty());
    let entry = s.ledger.create(req, header_key).await?;
    Ok(Json(entry))
}

#[axum::debug_handler]
async fn list(
    State(s): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> Result<Json<Vec<EntryDetail>>, AppMessage> {
    let filter = q.entry_filter()?;
    let items = s.ledger.list(&filter).await?;
    log::debug!("listed {} entries for {:?}", items.len(), filter);
    Ok(Json(items))
}

#[axum::debug_handler]
async fn summary(
    State(s): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> Result<Json<Summary>, AppMessage> {
    let filter = q.base_filter()?;
    Ok(Json(s.ledger.summary(&filter).await?))
}

/// Unparseable bodies count as an empty batch.
#[axum::debug_handler]
async fn batch(State(s): State<AppState>, body: Bytes) -> Json<BatchOutcome> {
    let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
    Json(s.ledger.create_batch(body).await)
}

#[derive(Deserialize)]
struct ImportQuery {
    delimiter: Option<String>,
}

#[axum_macros::debug_handler]
async fn import_csv(
    State(s): State<AppState>,
    Query(q): Query<ImportQuery>,
    mut multipart: Multipart,
) -> Result<Json<BatchOutcome>, AppMessage> {
    let delimiter = import::parse_delimiter(q.delimiter.as_deref())?;

    let mut rows = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Error::Upload(err.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            log::debug!("skipping non-file field {:?}", field.name());
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| Error::Upload(err.to_string()))?;
        let parsed = import::read_rows(&bytes, delimiter);
        log::info!("read {} csv rows from {:?}", parsed.len(), name);
        rows.extend(parsed);
    }

    Ok(Json(s.ledger.create_many(rows).await))
}
