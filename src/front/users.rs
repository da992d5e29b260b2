use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{error::ApiError, AppState};
use crate::models::UserId;

/// The user a request is authenticated as, taken from its bearer token.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, s: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::InvalidToken)?;

        Ok(CurrentUser(s.auth.verify(token)?))
    }
}

#[derive(Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

impl Credentials {
    fn from_body(body: Result<Json<Credentials>, JsonRejection>) -> Result<(String, String), ApiError> {
        let missing = || ApiError::bad_request("Missing username or password");
        let Json(c) = body.map_err(|_| missing())?;
        match (c.username, c.password) {
            (Some(username), Some(password)) => Ok((username, password)),
            _ => Err(missing()),
        }
    }
}

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn register(
    State(s): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (username, password) = Credentials::from_body(body)?;
    s.auth.register(&username, &password).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully" })),
    )
        .into_response())
}

async fn login(
    State(s): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, ApiError> {
    let (username, password) = Credentials::from_body(body)?;
    let token = s.auth.authenticate(&username, &password).await?;

    Ok(Json(json!({ "access_token": token })).into_response())
}
