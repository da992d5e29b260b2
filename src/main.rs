use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use finance_tracker::{
    config::Config,
    front::{self, AppState},
    migration,
    store::{MemoryStore, PgStore, TransactionStore},
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init_from_env(Env::default().default_filter_or("finance_tracker=info"))?;

    let config = Config::parse();
    config.validate()?;

    let store: Arc<dyn TransactionStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await
                .context("cannot connect to database")?;
            migration::migrate(&pool, &config.migrations_dir).await?;
            Arc::new(PgStore::new(pool))
        }
        None => {
            log::warn!("DATABASE_URL is not set, data is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, config.auth_settings()?, config.delimiter_byte());
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;

    front::start_web_server(listener, state, config.max_upload_bytes).await
}
