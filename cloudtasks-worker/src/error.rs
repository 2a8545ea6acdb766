//! Crate-level error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::tasks::TasksError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Handler '{0}' not found")]
    HandlerNotFound(String),

    #[error("Queue '{0}' not found")]
    QueueNotFound(String),

    #[error("Cloud Tasks error: {0}")]
    Remote(#[from] TasksError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handler '{handler_id}' failed: {source}")]
    Handler {
        handler_id: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
