//! In-memory fakes shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tasks::{Connector, RemoteQueue, Task, TasksClient, TasksError};
use crate::web::{AuthError, Dispatcher, IdTokenVerifier};

pub fn base_config() -> Config {
    Config {
        handler_path: "/tasks".to_string(),
        location: "us-central1".to_string(),
        project: "p".to_string(),
        service_account: None,
        service_url: "https://svc".to_string(),
        rate_limits: None,
        retry_config: None,
    }
}

// =============================================================================
// Tasks client
// =============================================================================

#[derive(Debug, Clone)]
pub enum Call {
    GetQueue { name: String },
    CreateQueue { parent: String, queue: RemoteQueue },
    UpdateQueue { queue: RemoteQueue },
    CreateTask { parent: String, task: Task },
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::GetQueue { .. } => "get_queue",
            Call::CreateQueue { .. } => "create_queue",
            Call::UpdateQueue { .. } => "update_queue",
            Call::CreateTask { .. } => "create_task",
        }
    }
}

type ErrorFn = Box<dyn Fn() -> TasksError + Send + Sync>;

#[derive(Default)]
struct FakeState {
    queue: Option<RemoteQueue>,
    raced: Option<RemoteQueue>,
    calls: Vec<Call>,
    get_error: Option<ErrorFn>,
    create_task_error: Option<ErrorFn>,
}

/// Records every call and keeps a single queue in memory.
#[derive(Default)]
pub struct FakeTasksClient {
    state: Mutex<FakeState>,
}

impl FakeTasksClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(queue: RemoteQueue) -> Self {
        let client = Self::default();
        client.state.lock().unwrap().queue = Some(queue);
        client
    }

    pub fn fail_get_with(&self, f: impl Fn() -> TasksError + Send + Sync + 'static) {
        self.state.lock().unwrap().get_error = Some(Box::new(f));
    }

    pub fn fail_create_task_with(&self, f: impl Fn() -> TasksError + Send + Sync + 'static) {
        self.state.lock().unwrap().create_task_error = Some(Box::new(f));
    }

    /// Make the next create fail as if another process created `queue` first.
    pub fn race_create_with(&self, queue: RemoteQueue) {
        self.state.lock().unwrap().raced = Some(queue);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl TasksClient for FakeTasksClient {
    async fn get_queue(&self, name: &str) -> std::result::Result<RemoteQueue, TasksError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetQueue {
            name: name.to_string(),
        });
        if let Some(f) = &state.get_error {
            return Err(f());
        }
        state
            .queue
            .clone()
            .ok_or_else(|| TasksError::NotFound(name.to_string()))
    }

    async fn create_queue(
        &self,
        parent: &str,
        queue: &RemoteQueue,
    ) -> std::result::Result<RemoteQueue, TasksError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateQueue {
            parent: parent.to_string(),
            queue: queue.clone(),
        });
        if let Some(raced) = state.raced.take() {
            state.queue = Some(raced);
        }
        if state.queue.is_some() {
            return Err(TasksError::AlreadyExists(queue.name.clone()));
        }
        state.queue = Some(queue.clone());
        Ok(queue.clone())
    }

    async fn update_queue(&self, queue: &RemoteQueue) -> std::result::Result<RemoteQueue, TasksError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateQueue {
            queue: queue.clone(),
        });
        let stored = state
            .queue
            .as_mut()
            .ok_or_else(|| TasksError::NotFound(queue.name.clone()))?;
        if queue.rate_limits.is_some() {
            stored.rate_limits = queue.rate_limits.clone();
        }
        if queue.retry_config.is_some() {
            stored.retry_config = queue.retry_config.clone();
        }
        Ok(stored.clone())
    }

    async fn create_task(&self, parent: &str, task: &Task) -> std::result::Result<(), TasksError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateTask {
            parent: parent.to_string(),
            task: task.clone(),
        });
        match &state.create_task_error {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }
}

/// Hands out a shared [`FakeTasksClient`] and counts connections.
pub struct FakeConnector {
    client: Arc<FakeTasksClient>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(client: Arc<FakeTasksClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> std::result::Result<Arc<dyn TasksClient>, TasksError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.client.clone())
    }
}

// =============================================================================
// Webhook collaborators
// =============================================================================

/// Accepts exactly one token and records every verification.
pub struct FakeVerifier {
    valid_token: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeVerifier {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: valid_token.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdTokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str, audience: &str) -> std::result::Result<(), AuthError> {
        self.calls
            .lock()
            .unwrap()
            .push((token.to_string(), audience.to_string()));
        if token == self.valid_token {
            Ok(())
        } else {
            Err(AuthError::Rejected("signature mismatch".to_string()))
        }
    }
}

type DispatchErrorFn = Box<dyn Fn() -> Error + Send + Sync>;

/// Records dispatches, optionally failing each one.
#[derive(Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<(String, String, Vec<Value>)>>,
    error: Mutex<Option<DispatchErrorFn>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, f: impl Fn() -> Error + Send + Sync + 'static) {
        *self.error.lock().unwrap() = Some(Box::new(f));
    }

    pub fn calls(&self) -> Vec<(String, String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, queue_name: &str, handler_id: &str, args: Vec<Value>) -> Result<()> {
        self.calls.lock().unwrap().push((
            queue_name.to_string(),
            handler_id.to_string(),
            args,
        ));
        match &*self.error.lock().unwrap() {
            Some(f) => Err(f()),
            None => Ok(()),
        }
    }
}
