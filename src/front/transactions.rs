use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{error::ApiError, users::CurrentUser, AppState};
use crate::store::DateRange;

const UPLOAD_FIELD: &str = "data";

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/transactions", get(list).post(upload))
        .route("/report", get(report))
}

#[derive(Deserialize)]
struct RangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl RangeQuery {
    fn normalize(&self) -> Result<DateRange, ApiError> {
        Ok(DateRange::parse(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?)
    }
}

#[axum_macros::debug_handler]
async fn upload(
    State(s): State<AppState>,
    CurrentUser(owner): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::bad_request("No file provided"))?;

    let mut payload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            log::debug!(
                "user {} uploads file_name={:?}",
                owner,
                field.file_name().unwrap_or_default()
            );
            payload = Some(field.bytes().await?);
            break;
        }
    }

    let payload = payload.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    if payload.is_empty() {
        return Err(ApiError::bad_request("Empty file"));
    }

    match s.ingestor.ingest(&payload, owner).await {
        Ok(report) => {
            let status = if report.added_count > 0 {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            Ok((
                status,
                Json(json!({
                    "message": "Transactions processed",
                    "transactions_added": report.added_count,
                    "errors": report.errors,
                })),
            )
                .into_response())
        }
        Err(err) => Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Database error occurred",
                "transactions_added": err.report.added_count,
                "errors": err.report.errors,
            })),
        )
            .into_response()),
    }
}

async fn list(
    State(s): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Query(q): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = q.normalize()?;
    let transactions = s.store.query(owner, range).await?;
    Ok(Json(transactions).into_response())
}

async fn report(
    State(s): State<AppState>,
    CurrentUser(owner): CurrentUser,
    Query(q): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = q.normalize()?;
    let report = s.reports.report(owner, range).await?;
    Ok(Json(report).into_response())
}
