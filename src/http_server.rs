use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::logic::{evaluate_all_field_logic, FieldState, FormData};
use crate::schema::FormSchema;
use crate::store::{JsonFileStore, DEFAULT_LOG_LIMIT};
use crate::submission::{apply_transforms, validate_submission, FieldError};
use crate::types::{NewWebhook, Webhook, WebhookLog, WebhookUpdate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<JsonFileStore>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Body of the submission trigger, sent once the response row is stored.
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub form_id: String,
    pub response_id: String,
    #[serde(default)]
    pub data: FormData,
}

#[derive(Debug, Deserialize)]
pub struct SchemaRequest {
    pub schema: FormSchema,
    #[serde(default)]
    pub data: FormData,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub data: FormData,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trigger-webhooks", post(trigger_webhooks))
        .route(
            "/forms/{form_id}/webhooks",
            get(list_webhooks).post(create_webhook),
        )
        .route("/forms/{form_id}/webhook-logs", get(webhook_logs))
        .route("/webhooks/{webhook_id}", patch(update_webhook).delete(delete_webhook))
        .route("/logic/evaluate", post(evaluate_logic))
        .route("/submissions/validate", post(validate))
        .with_state(state)
}

/// Bind `addr`, serve in the background, and return the bound address.
pub async fn start(addr: &str, state: ServerState) -> Result<SocketAddr, Error> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "HTTP server listening");

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("HTTP server error: {e}");
        }
    });

    Ok(local)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Acknowledge immediately; deliveries run on a background task.
async fn trigger_webhooks(
    State(state): State<ServerState>,
    Json(req): Json<TriggerRequest>,
) -> StatusCode {
    tracing::debug!(form_id = %req.form_id, response_id = %req.response_id, "dispatch queued");
    state
        .dispatcher
        .spawn_dispatch(req.form_id, req.response_id, req.data);
    StatusCode::ACCEPTED
}

async fn list_webhooks(
    Path(form_id): Path<String>,
    State(state): State<ServerState>,
) -> Json<Vec<Webhook>> {
    Json(state.store.list_webhooks(&form_id).await)
}

async fn create_webhook(
    Path(form_id): Path<String>,
    State(state): State<ServerState>,
    Json(new): Json<NewWebhook>,
) -> Result<(StatusCode, Json<Webhook>), Error> {
    let created = state.store.create_webhook(&form_id, new).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_webhook(
    Path(webhook_id): Path<String>,
    State(state): State<ServerState>,
    Json(update): Json<WebhookUpdate>,
) -> Result<Json<Webhook>, Error> {
    Ok(Json(state.store.update_webhook(&webhook_id, update).await?))
}

async fn delete_webhook(
    Path(webhook_id): Path<String>,
    State(state): State<ServerState>,
) -> Result<StatusCode, Error> {
    state.store.delete_webhook(&webhook_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn webhook_logs(
    Path(form_id): Path<String>,
    Query(query): Query<LogsQuery>,
    State(state): State<ServerState>,
) -> Json<Vec<WebhookLog>> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Json(state.store.webhook_logs(&form_id, limit).await)
}

async fn evaluate_logic(Json(req): Json<SchemaRequest>) -> Json<HashMap<String, FieldState>> {
    Json(evaluate_all_field_logic(&req.schema, &req.data))
}

async fn validate(Json(req): Json<SchemaRequest>) -> Json<ValidateResponse> {
    let data = apply_transforms(&req.schema, &req.data);
    let errors = validate_submission(&req.schema, &data);
    Json(ValidateResponse { data, errors })
}
