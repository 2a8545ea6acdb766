//! Queue orchestration: owns queues by name and routes deliveries to them.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::Router;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{Config, QueueOptions};
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::tasks::Connector;
use crate::web::{webhook_router, Dispatcher, IdTokenVerifier};

/// Set of queues sharing a base config and one webhook endpoint.
///
/// Queues live for the lifetime of the orchestrator; there is no removal.
pub struct QueueOrchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl QueueOrchestrator {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            queues: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create and register a queue, applying `overrides` over the base config.
    ///
    /// Declaring a name twice replaces the earlier queue and its handlers.
    pub fn add_queue(&self, name: &str, overrides: Option<QueueOptions>) -> Result<Arc<Queue>> {
        let config = match &overrides {
            Some(overrides) => self.config.with_overrides(overrides),
            None => self.config.clone(),
        };
        let queue = Arc::new(Queue::new(name, config, self.connector.clone())?);

        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        if queues.insert(name.to_string(), queue.clone()).is_some() {
            warn!(queue = %name, "queue_replaced");
        }

        Ok(queue)
    }

    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        let queues = self.queues.read().unwrap_or_else(|e| e.into_inner());
        queues.get(name).cloned()
    }

    /// Run the handler registered under `handler_id` on queue `queue_name`.
    pub async fn dispatch(&self, queue_name: &str, handler_id: &str, args: Vec<Value>) -> Result<()> {
        let queue = self
            .queue(queue_name)
            .ok_or_else(|| Error::QueueNotFound(queue_name.to_string()))?;
        let handler = queue.get_handler(handler_id)?;

        debug!(queue = %queue_name, handler_id = %handler_id, args = args.len(), "handler_invoking");

        // A panicking handler fails the delivery instead of the receiver.
        let outcome = AssertUnwindSafe(async move { handler(args).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(queue = %queue_name, handler_id = %handler_id, panic = %message, "handler_panicked");
                Err(anyhow!("handler panicked: {}", message))
            });

        outcome.map_err(|source| Error::Handler {
            handler_id: handler_id.to_string(),
            source,
        })
    }

    /// Webhook router delivering to this orchestrator's queues.
    pub fn router(self: &Arc<Self>, verifier: Arc<dyn IdTokenVerifier>) -> Result<Router> {
        webhook_router(&self.config, self.clone(), verifier)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[async_trait]
impl Dispatcher for QueueOrchestrator {
    async fn dispatch(&self, queue_name: &str, handler_id: &str, args: Vec<Value>) -> Result<()> {
        QueueOrchestrator::dispatch(self, queue_name, handler_id, args).await
    }
}
