//! Cloud Tasks service access.
//!
//! This module provides:
//! - Resource types for queues and tasks
//! - The [`TasksClient`] capability and its REST implementation
//! - Deterministic resource path building

pub mod client;
pub mod rest;
pub mod types;

pub use client::{location_path, queue_path, Connector, TasksClient, TasksError};
pub use rest::{AccessTokens, RestConnector, RestTasksClient};
pub use types::{
    Duration, HttpMethod, HttpRequest, OidcToken, QueueRetryConfig, RemoteQueue, Task,
};
