//! REST request executor
//!
//! Runs outbound HTTP calls on runtime worker tasks, never on the socket read
//! loop. Concurrency is bounded by a semaphore and every non-success status is
//! returned as a classified [`RestError`].

use chat_common::{RestError, RestResult, RestSettings};
use chat_core::TokenProvider;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Debug, Deserialize)]
struct GatewayUrlResponse {
    url: String,
}

/// Bounded executor for authenticated REST calls
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    base_url: Arc<str>,
    tokens: Arc<dyn TokenProvider>,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl RequestExecutor {
    /// Create an executor from REST settings
    pub fn new(settings: &RestSettings, tokens: Arc<dyn TokenProvider>) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RestError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').into(),
            tokens,
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a future on a runtime worker task
    ///
    /// Used for work triggered from the read loop (such as a user lookup) so that
    /// the loop never waits on HTTP.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(future)
    }

    /// Build a request for `path` with the auth header attached
    pub fn request(&self, method: Method, path: &str) -> RestResult<RequestBuilder> {
        let token = self.tokens.token().map_err(|e| {
            tracing::warn!(error = %e, "No token for REST call");
            RestError::Unauthorized
        })?;

        Ok(self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::AUTHORIZATION, token))
    }

    /// Send a request and decode its JSON body
    pub async fn execute(&self, request: RequestBuilder) -> RestResult<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RestError::Transport("request executor closed".to_string()))?;

        let response = request
            .send()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = RestError::from_status(status.as_u16(), body);
            tracing::debug!(status = status.as_u16(), code = error.error_code(), "REST call failed");
            return Err(error);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RestError::Transport(e.to_string()))?;

        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| RestError::Decode(e.to_string()))
    }

    /// `GET {path}`
    pub async fn get(&self, path: &str) -> RestResult<Value> {
        let request = self.request(Method::GET, path)?;
        self.execute(request).await
    }

    /// Resolve the gateway URL (`GET /gateway`)
    pub async fn fetch_gateway_url(&self) -> RestResult<String> {
        let body = self.get("/gateway").await?;
        let response: GatewayUrlResponse =
            serde_json::from_value(body).map_err(|e| RestError::Decode(e.to_string()))?;
        Ok(response.url)
    }

    /// Fetch a user (`GET /users/{id}`)
    pub async fn get_user(&self, user_id: &str) -> RestResult<Value> {
        self.get(&format!("/users/{user_id}")).await
    }
}
