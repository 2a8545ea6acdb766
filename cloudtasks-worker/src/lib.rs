//! CloudTasks Worker - named job queues on Google Cloud Tasks.
//!
//! Applications enqueue named, argument-carrying jobs and receive them back
//! through one authenticated webhook that dispatches to local handlers.
//!
//! ## Architecture
//!
//! ```text
//! Queue::add_task → reconcile queue → Cloud Tasks → webhook → QueueOrchestrator → handler
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloudtasks::{handler_fn, Config, QueueOrchestrator, RestConnector, TaskOptions, TokenInfoVerifier};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config {
//!     handler_path: "/tasks".into(),
//!     location: "us-central1".into(),
//!     project: "my-project".into(),
//!     service_url: "https://worker.example.com".into(),
//!     ..Default::default()
//! };
//!
//! let connector = Arc::new(RestConnector::new("https://cloudtasks.googleapis.com/v2", None));
//! let orchestrator = Arc::new(QueueOrchestrator::new(config, connector)?);
//!
//! let emails = orchestrator.add_queue("emails", None)?;
//! emails.add_handler("send", handler_fn(|args| async move {
//!     println!("sending to {:?}", args);
//!     Ok(())
//! }));
//!
//! let verifier = Arc::new(TokenInfoVerifier::new(reqwest::Client::new(), cloudtasks::config::DEFAULT_TOKENINFO_URL));
//! let _router = orchestrator.router(verifier)?;
//!
//! emails.add_task("send", vec!["a@example.com".into()], TaskOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod tasks;
pub mod web;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{Config, ConfigError, QueueOptions, RateLimits, RetryConfig, Settings};
pub use error::{Error, Result};
pub use orchestrator::QueueOrchestrator;
pub use queue::{handler_fn, Handler, Queue, TaskOptions, TaskPayload};
pub use tasks::{Connector, RestConnector, TasksClient, TasksError};
pub use web::{webhook_router, Dispatcher, IdTokenVerifier, TokenInfoVerifier};
