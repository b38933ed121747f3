use std::sync::Arc;

use anyhow::Context;
use env_logger::Env;
use ledgerbook::{
    front::{self, AppState},
    migration,
    settings::Settings,
    store::{memory::MemoryStore, postgres::PgStore, Store},
};

/// `database.url` value that runs the service without Postgres.
const MEMORY_URL: &str = "memory://";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init_from_env(Env::default().default_filter_or("ledgerbook=info"))?;

    let settings = Settings::load().context("cannot load configuration")?;

    let store: Arc<dyn Store> = if settings.database.url == MEMORY_URL {
        log::warn!("using the in-memory store, nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let pg = PgStore::connect(&settings.database)
            .await
            .context("cannot connect to postgres")?;
        migration::migrate(pg.pool(), &settings.migrations_dir)
            .await
            .context("cannot migrate database")?;
        Arc::new(pg)
    };

    let state = AppState::new(store, &settings);
    front::start_web_server(state, &settings)
        .await
        .context("web server stopped")?;
    Ok(())
}
