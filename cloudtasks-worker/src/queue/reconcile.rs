//! Queue reconciliation.
//!
//! Brings the remote queue in line with the declared configuration before
//! tasks are submitted:
//!
//! ```text
//! get_queue ─ NotFound ─→ create_queue ─ AlreadyExists ─→ get_queue ─┐
//!     │                        │                                      │
//!     └──────── found ─────────┼──────────────→ diverged? ─ yes ─→ update_queue
//!                              ↓                    │
//!                           created                 no → fetched queue
//! ```
//!
//! Only fields present in the declared config are compared. A divergence on
//! any of them patches the whole declared block.

use tracing::{info, warn};

use crate::config::{Config, RateLimits, RetryConfig};
use crate::tasks::{
    location_path, queue_path, Duration, QueueRetryConfig, RemoteQueue, TasksClient, TasksError,
};

pub struct QueueReconciler {
    path: String,
    parent: String,
    rate_limits: Option<RateLimits>,
    retry_config: Option<RetryConfig>,
}

impl QueueReconciler {
    pub fn new(config: &Config, queue_name: &str) -> Self {
        Self {
            path: queue_path(&config.project, &config.location, queue_name),
            parent: location_path(&config.project, &config.location),
            rate_limits: config.rate_limits.clone(),
            retry_config: config.retry_config.clone(),
        }
    }

    /// Canonical resource name of the reconciled queue.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ensure the remote queue exists and matches the declared settings,
    /// returning its live descriptor.
    pub async fn reconcile(&self, client: &dyn TasksClient) -> Result<RemoteQueue, TasksError> {
        match client.get_queue(&self.path).await {
            Ok(remote) => self.update_if_diverged(client, remote).await,
            Err(TasksError::NotFound(_)) => self.create(client).await,
            Err(e) => Err(e),
        }
    }

    async fn create(&self, client: &dyn TasksClient) -> Result<RemoteQueue, TasksError> {
        match client.create_queue(&self.parent, &self.desired()).await {
            Ok(created) => {
                info!(queue = %self.path, "queue_created");
                Ok(created)
            }
            Err(TasksError::AlreadyExists(_)) => {
                // Another process created it between our get and create.
                warn!(queue = %self.path, "queue_create_raced");
                let remote = client.get_queue(&self.path).await?;
                self.update_if_diverged(client, remote).await
            }
            Err(e) => Err(e),
        }
    }

    async fn update_if_diverged(
        &self,
        client: &dyn TasksClient,
        remote: RemoteQueue,
    ) -> Result<RemoteQueue, TasksError> {
        if !self.diverged(&remote) {
            return Ok(remote);
        }

        let mut patch = self.desired();
        if !remote.name.is_empty() {
            patch.name = remote.name;
        }

        let updated = client.update_queue(&patch).await?;
        info!(queue = %patch.name, mask = %patch.update_mask(), "queue_updated");
        Ok(updated)
    }

    /// Descriptor carrying only the declared blocks.
    pub fn desired(&self) -> RemoteQueue {
        RemoteQueue {
            name: self.path.clone(),
            rate_limits: self.rate_limits.clone(),
            retry_config: self.retry_config.as_ref().map(QueueRetryConfig::from),
            state: None,
        }
    }

    /// Whether any declared field differs from the live queue.
    pub fn diverged(&self, remote: &RemoteQueue) -> bool {
        if let Some(declared) = &self.rate_limits {
            let live = remote.rate_limits.clone().unwrap_or_default();
            if differs(declared.max_dispatches_per_second, live.max_dispatches_per_second)
                || differs(declared.max_burst_size, live.max_burst_size)
                || differs(declared.max_concurrent_dispatches, live.max_concurrent_dispatches)
            {
                return true;
            }
        }

        if let Some(declared) = &self.retry_config {
            let live = remote.retry_config.clone().unwrap_or_default();
            let millis = |d: Option<Duration>| d.map(|d| d.as_millis());
            if differs(declared.max_attempts, live.max_attempts)
                || differs(declared.max_doublings, live.max_doublings)
                || differs(declared.max_retry_duration, millis(live.max_retry_duration))
                || differs(declared.min_backoff, millis(live.min_backoff))
                || differs(declared.max_backoff, millis(live.max_backoff))
            {
                return true;
            }
        }

        false
    }
}

/// A declared value differs when it is set and the live value is not equal.
fn differs<T: PartialEq>(declared: Option<T>, live: Option<T>) -> bool {
    match declared {
        Some(value) => live.as_ref() != Some(&value),
        None => false,
    }
}
