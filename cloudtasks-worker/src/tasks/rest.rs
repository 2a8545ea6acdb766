//! Cloud Tasks v2 REST client.
//!
//! Authenticates with either a static OAuth access token or a token fetched
//! from the GCE metadata server and cached until shortly before expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::client::{Connector, TasksClient, TasksError};
use super::types::{RemoteQueue, Task};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh cached tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Access tokens
// =============================================================================

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Source of OAuth access tokens for the Cloud Tasks API.
pub struct AccessTokens {
    static_token: Option<String>,
    cached: RwLock<Option<CachedToken>>,
}

impl AccessTokens {
    pub fn new(static_token: Option<String>) -> Self {
        Self {
            static_token: static_token.filter(|t| !t.trim().is_empty()),
            cached: RwLock::new(None),
        }
    }

    async fn token(&self, http: &Client) -> Result<String, TasksError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("metadata_token_fetching");

        let response = http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| TasksError::Credentials(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(TasksError::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: MetadataToken = response
            .json()
            .await
            .map_err(|e| TasksError::Credentials(format!("invalid metadata token: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        info!(expires_in = token.expires_in, "metadata_token_refreshed");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    task: &'a Task,
}

/// [`TasksClient`] backed by the Cloud Tasks REST API.
pub struct RestTasksClient {
    http: Client,
    base_url: String,
    tokens: AccessTokens,
}

impl RestTasksClient {
    pub fn new(http: Client, base_url: &str, tokens: AccessTokens) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, TasksError> {
        let token = self.tokens.token(&self.http).await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response.text().await.unwrap_or_default();
        debug!(resource = %resource, status = status.as_u16(), "cloud_tasks_request_failed");

        Err(match status {
            StatusCode::NOT_FOUND => TasksError::NotFound(resource.to_string()),
            StatusCode::CONFLICT => TasksError::AlreadyExists(resource.to_string()),
            _ => TasksError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl TasksClient for RestTasksClient {
    async fn get_queue(&self, name: &str) -> Result<RemoteQueue, TasksError> {
        self.send(self.http.get(self.url(name)), name).await
    }

    async fn create_queue(
        &self,
        parent: &str,
        queue: &RemoteQueue,
    ) -> Result<RemoteQueue, TasksError> {
        let request = self
            .http
            .post(self.url(&format!("{}/queues", parent)))
            .json(queue);
        self.send(request, &queue.name).await
    }

    async fn update_queue(&self, queue: &RemoteQueue) -> Result<RemoteQueue, TasksError> {
        let request = self
            .http
            .patch(self.url(&queue.name))
            .query(&[("updateMask", queue.update_mask())])
            .json(queue);
        self.send(request, &queue.name).await
    }

    async fn create_task(&self, parent: &str, task: &Task) -> Result<(), TasksError> {
        let request = self
            .http
            .post(self.url(&format!("{}/tasks", parent)))
            .json(&CreateTaskRequest { task });
        let _: IgnoredAny = self.send(request, parent).await?;
        Ok(())
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Builds a [`RestTasksClient`] on first use.
#[derive(Debug, Clone)]
pub struct RestConnector {
    base_url: String,
    access_token: Option<String>,
}

impl RestConnector {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token,
        }
    }
}

#[async_trait]
impl Connector for RestConnector {
    async fn connect(&self) -> Result<Arc<dyn TasksClient>, TasksError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        info!(base_url = %self.base_url, "cloud_tasks_client_created");

        Ok(Arc::new(RestTasksClient::new(
            http,
            &self.base_url,
            AccessTokens::new(self.access_token.clone()),
        )))
    }
}
