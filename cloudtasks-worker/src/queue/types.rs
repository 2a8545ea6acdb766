//! Task payload and submission options.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content type of task bodies.
pub const TASK_CONTENT_TYPE: &str = "application/octet-stream";

/// Payload carried by every task: which handler to run and its arguments.
///
/// Wire format is `{"handlerId": string, "args": array}`. Both fields
/// default when absent so inbound bodies can be checked explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default)]
    pub handler_id: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl TaskPayload {
    pub fn new(handler_id: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            handler_id: handler_id.into(),
            args,
        }
    }

    /// JSON-encode then base64-encode, as expected in a task body.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(STANDARD.encode(serde_json::to_vec(self)?))
    }
}

/// Options for a single task submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Defer delivery until this instant
    pub schedule_time: Option<DateTime<Utc>>,

    /// Deadline for a single delivery attempt, in milliseconds
    pub dispatch_deadline: Option<u64>,
}
