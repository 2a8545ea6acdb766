//! A named queue: handlers, reconciliation and task submission.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::info;

use super::reconcile::QueueReconciler;
use super::registry::{Handler, HandlerRegistry};
use super::types::{TaskOptions, TaskPayload, TASK_CONTENT_TYPE};
use crate::config::Config;
use crate::error::Result;
use crate::tasks::{
    Connector, Duration, HttpMethod, HttpRequest, OidcToken, Task, TasksClient, TasksError,
};

pub struct Queue {
    name: String,
    config: Config,
    handler_url: String,
    handlers: HandlerRegistry,
    reconciler: QueueReconciler,
    connector: Arc<dyn Connector>,
    client: OnceCell<Arc<dyn TasksClient>>,
}

impl Queue {
    /// Build a queue from a validated config. The remote client is not
    /// opened until the first task is submitted.
    pub fn new(name: impl Into<String>, config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let handler_url = config.handler_url()?.to_string();
        let name = name.into();

        Ok(Self {
            reconciler: QueueReconciler::new(&config, &name),
            name,
            config,
            handler_url,
            handlers: HandlerRegistry::new(),
            connector,
            client: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resource name of the remote queue.
    pub fn path(&self) -> &str {
        self.reconciler.path()
    }

    pub fn add_handler(&self, handler_id: impl Into<String>, handler: Handler) {
        let handler_id = handler_id.into();
        info!(queue = %self.name, handler_id = %handler_id, "handler_registered");
        self.handlers.register(handler_id, handler);
    }

    pub fn get_handler(&self, handler_id: &str) -> Result<Handler> {
        self.handlers.resolve(handler_id)
    }

    /// Enqueue a call to `handler_id` with `args`.
    ///
    /// The remote queue is reconciled against the declared config on every
    /// call. Submission errors are returned as is; retries of deliveries are
    /// left to the service.
    pub async fn add_task(
        &self,
        handler_id: &str,
        args: Vec<Value>,
        options: TaskOptions,
    ) -> Result<()> {
        let client = self.client().await?;
        let remote = self.reconciler.reconcile(client.as_ref()).await?;
        let parent = if remote.name.is_empty() {
            self.reconciler.path().to_string()
        } else {
            remote.name
        };

        let payload = TaskPayload::new(handler_id, args);
        let task = self.build_task(&payload, &options)?;

        client.create_task(&parent, &task).await?;

        info!(
            queue = %self.name,
            handler_id = %handler_id,
            scheduled = options.schedule_time.is_some(),
            "task_created"
        );

        Ok(())
    }

    async fn client(&self) -> std::result::Result<&Arc<dyn TasksClient>, TasksError> {
        self.client
            .get_or_try_init(|| self.connector.connect())
            .await
    }

    fn build_task(&self, payload: &TaskPayload, options: &TaskOptions) -> Result<Task> {
        let headers = BTreeMap::from([(
            "Content-Type".to_string(),
            TASK_CONTENT_TYPE.to_string(),
        )]);

        let oidc_token = self.config.service_account_email().map(|email| OidcToken {
            service_account_email: email,
            audience: None,
        });

        Ok(Task {
            http_request: HttpRequest {
                url: self.handler_url.clone(),
                http_method: HttpMethod::Post,
                headers,
                body: payload.encode()?,
                oidc_token,
            },
            schedule_time: options.schedule_time,
            dispatch_deadline: options.dispatch_deadline.map(Duration::from_millis),
        })
    }
}
