pub mod error;
pub mod transactions;
pub mod users;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::limit::RequestBodyLimitLayer;

use crate::{
    auth::{AuthGateway, AuthSettings},
    ingest::BatchIngestor,
    report::ReportAggregator,
    store::TransactionStore,
};

/// Shared handles, built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TransactionStore>,
    pub auth: AuthGateway,
    pub ingestor: BatchIngestor,
    pub reports: ReportAggregator,
}

impl AppState {
    pub fn new(store: Arc<dyn TransactionStore>, auth: AuthSettings, delimiter: u8) -> Self {
        Self {
            auth: AuthGateway::new(store.clone(), auth),
            ingestor: BatchIngestor::new(store.clone()).with_delimiter(delimiter),
            reports: ReportAggregator::new(store.clone()),
            store,
        }
    }
}

pub fn new_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(users::new_router())
        .merge(transactions::new_router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

pub async fn start_web_server(
    listener: tokio::net::TcpListener,
    state: AppState,
    max_upload_bytes: usize,
) -> anyhow::Result<()> {
    let app = new_router(state, max_upload_bytes);
    log::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Finance Tracker API! Use /register, /login, /transactions, /report"
    }))
}
