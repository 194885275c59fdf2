//! HTTP bridge to the main agent
//!
//! Delivers dispatched tasks and interrupts over plain JSON POSTs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use uuid::Uuid;

use crate::sinks::{DispatchRequest, DispatchSink};
use crate::{Error, Result};

/// Body of a task delivery
#[derive(Debug, Serialize)]
struct TaskBody<'a> {
    dispatch_id: Uuid,
    task: &'a str,
}

/// Dispatch sink that talks to the main agent over HTTP
#[derive(Debug, Clone)]
pub struct HttpAgentBridge {
    /// HTTP client
    client: Client,
    /// Base URL of the main agent API, without trailing slash
    base_url: String,
    /// Optional bearer token
    token: Option<SecretString>,
}

impl HttpAgentBridge {
    /// Create a new bridge
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL or the HTTP client
    /// cannot be built
    pub fn new(base_url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}/{path}", self.base_url);

        let mut req = self.client.post(&url).json(body);

        if let Some(token) = &self.token {
            req = req.bearer_auth(token.expose_secret());
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Bridge(format!("main agent returned {status}: {body}")));
        }

        Ok(())
    }
}

#[async_trait]
impl DispatchSink for HttpAgentBridge {
    fn name(&self) -> &str {
        "http"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<()> {
        tracing::debug!(
            dispatch_id = %request.dispatch_id,
            url = %self.base_url,
            "delivering task to main agent"
        );
        self.post(
            "tasks",
            &TaskBody {
                dispatch_id: request.dispatch_id,
                task: &request.task_content,
            },
        )
        .await
    }

    async fn interrupt(&self) -> Result<()> {
        tracing::debug!(url = %self.base_url, "interrupting main agent");
        self.post("interrupt", &serde_json::json!({})).await
    }
}

/// Dispatch sink used when no main agent URL is configured
///
/// Every call fails, so queued tasks stay visibly queued instead of being
/// silently discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredBridge;

#[async_trait]
impl DispatchSink for UnconfiguredBridge {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn dispatch(&self, _request: &DispatchRequest) -> Result<()> {
        Err(Error::Bridge("main agent bridge not configured".to_string()))
    }

    async fn interrupt(&self) -> Result<()> {
        Err(Error::Bridge("main agent bridge not configured".to_string()))
    }
}
