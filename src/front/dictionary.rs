use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AppMessage, AppState};
use crate::models::{DictionaryItem, DictionaryKind};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/:kind", get(list).post(quick_create))
        .route("/:kind/:id", delete(deactivate))
}

#[derive(Deserialize)]
struct ListQuery {
    q: Option<String>,
}

#[axum::debug_handler]
async fn list(
    State(s): State<AppState>,
    Path(kind): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<DictionaryItem>>, AppMessage> {
    let kind: DictionaryKind = kind.parse()?;
    Ok(Json(s.dictionaries.list(kind, q.q.as_deref()).await?))
}

#[derive(Deserialize)]
struct QuickCreate {
    name: Option<String>,
    direction: Option<String>,
}

#[axum::debug_handler]
async fn quick_create(
    State(s): State<AppState>,
    Path(kind): Path<String>,
    body: Result<Json<QuickCreate>, JsonRejection>,
) -> Result<Json<DictionaryItem>, AppMessage> {
    let Json(body) = body?;
    let kind: DictionaryKind = kind.parse()?;
    let item = s
        .dictionaries
        .quick_create(kind, body.name.as_deref().unwrap_or(""), body.direction.as_deref())
        .await?;
    Ok(Json(item))
}

#[axum::debug_handler]
async fn deactivate(
    State(s): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<Value>, AppMessage> {
    let kind: DictionaryKind = kind.parse()?;
    s.dictionaries.deactivate(kind, id).await?;
    Ok(Json(json!({ "ok": true })))
}
