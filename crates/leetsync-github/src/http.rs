use leetsync_core::{SyncConfig, SyncError};
use reqwest::{Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::sync::Arc;
use std::time::Duration;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// HTTP clients for talking to GitHub.
///
/// Reads go through a client with transient-failure retry. Writes use a
/// plain client so a create request is sent exactly once.
#[derive(Debug, Clone)]
pub struct GitHubHttp {
    reader: Arc<ClientWithMiddleware>,
    writer: Arc<ClientWithMiddleware>,
    user_agent: String,
}

impl GitHubHttp {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Same as `from_config` but on top of a caller-built client.
    pub fn with_client(client: Client, config: &SyncConfig) -> Self {
        let reader = if config.http_max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder()
                .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
                .build_with_max_retries(config.http_max_retries);
            ClientBuilder::new(client.clone())
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build()
        } else {
            ClientBuilder::new(client.clone()).build()
        };

        Self {
            reader: Arc::new(reader),
            writer: Arc::new(ClientBuilder::new(client).build()),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Clients without retry and without proxy lookup, for tests against a local mock.
    pub fn without_retry(user_agent: impl Into<String>) -> Self {
        let client = Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());
        let plain = Arc::new(ClientBuilder::new(client).build());
        Self {
            reader: plain.clone(),
            writer: plain,
            user_agent: user_agent.into(),
        }
    }

    pub fn reader(&self) -> &ClientWithMiddleware {
        &self.reader
    }

    pub fn writer(&self) -> &ClientWithMiddleware {
        &self.writer
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Decorates a REST API request with the bearer credential and the
    /// headers GitHub expects.
    pub fn api_request(
        &self,
        builder: reqwest_middleware::RequestBuilder,
        credential: &str,
    ) -> reqwest_middleware::RequestBuilder {
        builder
            .bearer_auth(credential)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", &self.user_agent)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }
}

/// Turns a non-success response into `RemoteRejected`, passing GitHub's
/// `message` through when the body carries one.
pub async fn remote_error(response: Response) -> SyncError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            format!(
                "GitHub request failed: {}",
                status.canonical_reason().unwrap_or("unexpected status")
            )
        });

    SyncError::RemoteRejected {
        status: status.as_u16(),
        message,
    }
}
