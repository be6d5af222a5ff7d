//! HTTP API.
//!
//! Thin axum layer over [`AccountService`]: deserialization, routing, and
//! error-to-status mapping. All domain behavior lives in the core crate.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use legator_core::{
    Account, AccountService, CoreError, CreateAccountRequest, PayoutDestination, RecipientId,
    StoreError,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The service all handlers delegate to.
    pub service: Arc<AccountService>,
}

/// Builds the API router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/accounts", post(create_account))
        .route("/accounts/:owner_key", get(get_account))
        .route(
            "/accounts/:owner_key/recipients/:recipient_id/destination",
            put(update_destination),
        )
        .route("/activity/ping", post(ping))
        .with_state(state)
}

/// Error envelope returned to clients.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP-facing error: a status code plus a client-safe message.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
            CoreError::Store(StoreError::Conflict { .. })
            | CoreError::Store(StoreError::DuplicateOwner { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Internal failure detail stays in the log, not the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %e, "request failed");
            "internal error".to_string()
        } else {
            e.to_string()
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let account = state.service.create_account(request).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(state): State<AppState>,
    Path(owner_key): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let account = state.service.get_account(&owner_key).await?;
    Ok(Json(account))
}

/// Body of an activity ping.
#[derive(Debug, Deserialize)]
struct PingRequest {
    owner_key: String,
}

/// Acknowledgement of an activity ping.
#[derive(Debug, Serialize)]
struct PingResponse {
    owner_key: String,
    lifecycle_state: &'static str,
    last_activity_at: Option<DateTime<Utc>>,
}

async fn ping(
    State(state): State<AppState>,
    Json(request): Json<PingRequest>,
) -> Result<Json<PingResponse>, ApiError> {
    let account = state.service.record_activity(&request.owner_key).await?;
    debug!(owner_key = %account.owner_key, "activity ping accepted");
    Ok(Json(PingResponse {
        owner_key: account.owner_key,
        lifecycle_state: account.lifecycle_state.as_str(),
        last_activity_at: account.last_activity_at,
    }))
}

async fn update_destination(
    State(state): State<AppState>,
    Path((owner_key, recipient_id)): Path<(String, RecipientId)>,
    Json(destination): Json<PayoutDestination>,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .service
        .update_recipient_destination(&owner_key, recipient_id, destination)
        .await?;
    Ok(Json(account))
}
