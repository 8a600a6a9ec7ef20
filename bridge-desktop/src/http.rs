//! `HttpClient` over reqwest with rustls, retrying transient failures

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("mediasync-core/", env!("CARGO_PKG_VERSION"));

/// Result of one attempt that did not produce a usable response.
struct Failure {
    error: BridgeError,
    retryable: bool,
}

impl Failure {
    fn transient(message: String) -> Self {
        Self {
            error: BridgeError::OperationFailed(message),
            retryable: true,
        }
    }
}

pub struct ReqwestHttpClient {
    client: Client,
    retry_policy: RetryPolicy,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// `timeout` bounds a whole attempt; connecting is capped at ten seconds.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {e}")))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn send_once(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, Failure> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| Failure {
            retryable: e.is_timeout() || e.is_connect() || e.is_request(),
            error: BridgeError::OperationFailed(format!("{} {}: {e}", request.url, kind_of(&e))),
        })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::transient(format!("HTTP {status} from {}", request.url)));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::transient(format!("reading body of {}: {e}", request.url)))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn kind_of(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request, self.retry_policy.clone())
            .await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(url = %request.url, attempt, "Sending request");
            let failure = match self.send_once(&request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            if !failure.retryable || attempt >= attempts {
                return Err(failure.error);
            }
            let delay = policy.delay_for(attempt);
            warn!(error = %failure.error, attempt, delay_ms = delay.as_millis() as u64, "Retrying request");
            sleep(delay).await;
            attempt += 1;
        }
    }
}
