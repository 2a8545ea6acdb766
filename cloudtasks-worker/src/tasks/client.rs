//! Task-queue management capability consumed by queues.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::types::{RemoteQueue, Task};

/// Errors returned by the task-queue management service.
#[derive(Debug, Error)]
pub enum TasksError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Cloud Tasks API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Canonical resource name of a queue.
pub fn queue_path(project: &str, location: &str, queue: &str) -> String {
    format!("{}/queues/{}", location_path(project, location), queue)
}

/// Canonical resource name of a location, the parent of its queues.
pub fn location_path(project: &str, location: &str) -> String {
    format!("projects/{}/locations/{}", project, location)
}

/// Operations the core needs from the managed task-queue service.
#[async_trait]
pub trait TasksClient: Send + Sync {
    /// Fetch a queue by resource name. Fails with [`TasksError::NotFound`]
    /// when the queue does not exist.
    async fn get_queue(&self, name: &str) -> Result<RemoteQueue, TasksError>;

    /// Create a queue under a location.
    async fn create_queue(&self, parent: &str, queue: &RemoteQueue)
        -> Result<RemoteQueue, TasksError>;

    /// Update the blocks present on `queue`; absent blocks are left as is.
    async fn update_queue(&self, queue: &RemoteQueue) -> Result<RemoteQueue, TasksError>;

    /// Create a task on the queue named `parent`.
    async fn create_task(&self, parent: &str, task: &Task) -> Result<(), TasksError>;
}

/// Opens a client handle. Each queue connects once and reuses the handle.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn TasksClient>, TasksError>;
}
