pub mod auth;
pub mod dictionary;
pub mod entries;
pub mod health;
pub mod message;
pub mod uploads;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub use message::AppMessage;

use crate::{
    dictionary::Dictionaries, ledger::Ledger, settings::Settings, storage::StorageGateway,
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub dictionaries: Dictionaries,
    pub storage: Arc<StorageGateway>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, settings: &Settings) -> Self {
        Self {
            ledger: Ledger::new(store.clone()),
            dictionaries: Dictionaries::new(store),
            storage: Arc::new(StorageGateway::new(settings.storage.clone())),
            api_key: settings
                .auth
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        }
    }
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .nest("/api/entries", entries::new_router(state.clone()))
        .nest("/api/dictionary", dictionary::new_router())
        .nest("/api/uploads", uploads::new_router())
        .merge(health::new_router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

pub async fn start_web_server(state: AppState, settings: &Settings) -> std::io::Result<()> {
    if state.api_key.is_none() {
        log::warn!("no api key configured, batch endpoints will reject every request");
    }
    if !state.storage.is_configured() {
        log::warn!("object storage is not configured, upload signing is disabled");
    }

    let app = router(state, settings.server.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind).await?;
    log::info!("listening on http://{}", settings.server.bind);
    axum::serve(listener, app).await
}
