//! Webhook endpoint receiving Cloud Tasks deliveries.
//!
//! Each delivery goes through:
//! 1. Payload checks (body present, `handlerId` set)
//! 2. Bearer token verification, when a service account is configured
//! 3. Dispatch to the queue named by the `X-CloudTasks-QueueName` header
//!
//! Status codes tell Cloud Tasks what to do next: 2xx acknowledges the
//! delivery, 5xx makes the service retry it under the queue's retry config.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::TaskPayload;
use crate::web::auth::{bearer_token, AuthError, IdTokenVerifier};

/// Header Cloud Tasks sets to the short name of the delivering queue.
pub const QUEUE_NAME_HEADER: &str = "x-cloudtasks-queuename";

/// Routes a delivery to a handler.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, queue_name: &str, handler_id: &str, args: Vec<Value>) -> Result<()>;
}

/// Shared webhook state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<dyn Dispatcher>,
    /// Present only when deliveries must be authenticated
    pub verifier: Option<Arc<dyn IdTokenVerifier>>,
    /// Expected token audience: the absolute webhook URL
    pub audience: Arc<str>,
}

/// Build the router serving the webhook endpoint at `config.handler_path`.
///
/// Token verification is enforced only when `config.service_account` is set.
pub fn webhook_router(
    config: &Config,
    dispatcher: Arc<dyn Dispatcher>,
    verifier: Arc<dyn IdTokenVerifier>,
) -> Result<Router> {
    config.validate()?;
    let audience = config.handler_url()?.to_string();

    let state = AppState {
        dispatcher,
        verifier: config.service_account_email().map(|_| verifier),
        audience: Arc::from(audience),
    };

    let path = if config.handler_path.starts_with('/') {
        config.handler_path.clone()
    } else {
        format!("/{}", config.handler_path)
    };

    Ok(Router::new()
        .route(&path, post(task_webhook))
        .with_state(state))
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Router exposing `/health`.
pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

// =============================================================================
// Task Webhook
// =============================================================================

/// Webhook error response.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub error: &'static str,
}

fn reject(code: StatusCode, status: &'static str, error: &'static str) -> Response {
    (code, Json(WebhookResponse { status, error })).into_response()
}

/// Cloud Tasks delivery endpoint.
pub async fn task_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        warn!("webhook_no_payload");
        return reject(StatusCode::BAD_REQUEST, "bad_request", "no payload received");
    }

    let payload: TaskPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, body_length = body.len(), "webhook_invalid_payload");
            return reject(StatusCode::BAD_REQUEST, "bad_request", "invalid payload format");
        }
    };

    if payload.handler_id.is_empty() {
        warn!(body_length = body.len(), "webhook_missing_handler_id");
        return reject(StatusCode::BAD_REQUEST, "bad_request", "invalid payload format");
    }

    if let Some(verifier) = &state.verifier {
        if let Err(e) = authenticate(verifier.as_ref(), &headers, &state.audience).await {
            return match e {
                AuthError::MissingToken => {
                    warn!(handler_id = %payload.handler_id, "webhook_unauthenticated");
                    reject(StatusCode::UNAUTHORIZED, "unauthorized", "unauthenticated request")
                }
                e => {
                    warn!(handler_id = %payload.handler_id, error = %e, "webhook_invalid_token");
                    reject(StatusCode::BAD_REQUEST, "bad_request", "invalid token")
                }
            };
        }
    }

    let queue_name = headers
        .get(QUEUE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info!(
        queue = %queue_name,
        handler_id = %payload.handler_id,
        args = payload.args.len(),
        "webhook_received"
    );

    match state
        .dispatcher
        .dispatch(queue_name, &payload.handler_id, payload.args)
        .await
    {
        Ok(()) => {
            info!(queue = %queue_name, handler_id = %payload.handler_id, "webhook_dispatched");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(Error::HandlerNotFound(handler_id)) => {
            // Acknowledge so the service stops redelivering a task nobody handles.
            warn!(queue = %queue_name, handler_id = %handler_id, "webhook_handler_not_found");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(queue = %queue_name, handler_id = %payload.handler_id, error = %e, "webhook_dispatch_failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "error", "dispatch failed")
        }
    }
}

async fn authenticate(
    verifier: &dyn IdTokenVerifier,
    headers: &HeaderMap,
    audience: &str,
) -> std::result::Result<(), AuthError> {
    let token = bearer_token(headers)?;
    verifier.verify(token, audience).await
}
