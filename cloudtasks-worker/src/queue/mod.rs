//! Named task queues.
//!
//! This module provides:
//! - The task payload carried to and from Cloud Tasks
//! - A thread-safe handler registry
//! - Reconciliation of the remote queue against declared settings
//! - [`Queue`], which ties the three together
//!
//! ## Flow
//!
//! ```text
//! add_task → reconcile remote queue → create_task ─ ─ → webhook → handler
//! ```

pub mod reconcile;
pub mod registry;
pub mod task_queue;
pub mod types;

pub use reconcile::QueueReconciler;
pub use registry::{handler_fn, Handler, HandlerFuture, HandlerRegistry};
pub use task_queue::Queue;
pub use types::{TaskOptions, TaskPayload, TASK_CONTENT_TYPE};
