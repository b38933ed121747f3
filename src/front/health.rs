use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use super::{AppMessage, AppState};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn health_db(State(s): State<AppState>) -> Result<Json<Value>, AppMessage> {
    let entries = s.ledger.count().await?;
    Ok(Json(json!({ "ok": true, "entries": entries })))
}
