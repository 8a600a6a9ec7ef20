//! HTTP Client Abstraction
//!
//! Used by the image downloader to fetch banner, cover and episode images.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// How often and how patiently a client retries transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound for backoff delays
    pub max_delay: Duration,
    /// Double the delay after every failed attempt
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Host-provided HTTP transport. Only artwork downloads go through it, so
/// the surface is a plain request/response exchange.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::HttpClient;
///
/// async fn fetch_cover(client: &dyn HttpClient, url: &str) -> Result<Bytes> {
///     client.get_bytes(url).await
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Non-2xx statuses are returned as responses, not errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Clients without retry support ignore `policy`.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Fetch a URL and return its body, failing on non-2xx statuses.
    async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        let response = self.execute(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} fetching {}",
                response.status, url
            )));
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn response(status: u16, body: &'static str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::from([("Content-Type".to_string(), "image/png".to_string())]),
            body: Bytes::from(body),
        }
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::get("https://img.example/cover.png")
            .header("Accept", "image/*")
            .timeout(Duration::from_secs(5));

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.headers["Accept"], "image/*");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_response_header_lookup() {
        let response = response(200, "x");
        assert!(response.is_success());
        assert_eq!(response.header("content-type"), Some("image/png"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_retry_delay_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));

        let capped = RetryPolicy {
            max_delay: Duration::from_millis(150),
            ..RetryPolicy::default()
        };
        assert_eq!(capped.delay_for(5), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_get_bytes_rejects_error_status() {
        let mut client = MockHttp::new();
        client
            .expect_execute()
            .withf(|req| req.url.ends_with("missing.png"))
            .returning(|_| Ok(response(404, "")));
        client
            .expect_execute()
            .withf(|req| req.url.ends_with("cover.png"))
            .returning(|_| Ok(response(200, "png")));

        assert!(client.get_bytes("https://img.example/missing.png").await.is_err());
        let body = client.get_bytes("https://img.example/cover.png").await.unwrap();
        assert_eq!(body, Bytes::from("png"));
    }
}
