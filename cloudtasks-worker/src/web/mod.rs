//! Web module for receiving Cloud Tasks deliveries.
//!
//! This module provides a single webhook endpoint that:
//! - Rejects malformed payloads before doing any work
//! - Verifies the OIDC identity token when a service account is configured
//! - Dispatches the payload to the handler registered for its queue
//!
//! Handlers run inside the request; the response status drives redelivery.

pub mod auth;
pub mod handlers;

pub use auth::{bearer_token, AuthError, IdTokenVerifier, TokenInfoVerifier};
pub use handlers::{
    health, health_router, task_webhook, webhook_router, AppState, Dispatcher, HealthResponse,
    WebhookResponse, QUEUE_NAME_HEADER,
};
