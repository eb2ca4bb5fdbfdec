use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::http::retry::{RetryAfterSlot, RetryConfig, RetryPolicy};
use crate::observability::api_metrics;
use crate::riskmodeler::IrpError;

/// Longest slice of a non-JSON error body kept in error messages.
const ERROR_TEXT_LIMIT: usize = 500;

/// Everything needed to (re)build one request. Kept as plain data so the
/// retry loop can rebuild it for every attempt.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fully read response. The body is buffered so that it can be parsed as
/// JSON and still be quoted in error messages.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    url: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>, url: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            body,
            url: url.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, IrpError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| IrpError::malformed(self.url.clone(), e.to_string()))
    }

    /// Server detail for error messages: the JSON body when it parses,
    /// otherwise the leading text.
    fn error_detail(&self) -> Option<String> {
        if self.body.is_empty() {
            return None;
        }
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(json) => Some(format!("server: {json}")),
            Err(_) => {
                let text: String = self.text().chars().take(ERROR_TEXT_LIMIT).collect();
                Some(format!("text: {text}"))
            }
        }
    }

    fn into_error(self, method: &Method) -> IrpError {
        IrpError::Api {
            method: method.to_string(),
            url: self.url.clone(),
            status: self.status.as_u16(),
            detail: self.error_detail(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_headers: HeaderMap,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub requests_per_second: Option<u32>,
}

/// Reused HTTP session: one connection pool, default auth headers, optional
/// client-side rate limiting and the retry loop.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl HttpSession {
    pub fn new(config: SessionConfig) -> Result<Self, IrpError> {
        let client = reqwest::Client::builder()
            .default_headers(config.default_headers)
            .build()
            .map_err(|e| IrpError::Config(format!("failed to build HTTP client: {e}")))?;

        let rate_limiter = config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client,
            timeout: config.timeout,
            retry: RetryPolicy::new(config.retry),
            rate_limiter,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send a request, retrying throttled and transient failures. Any final
    /// non-2xx status becomes `IrpError::Api`.
    pub async fn send(&self, spec: &RequestSpec) -> Result<ApiResponse, IrpError> {
        let retry_after = RetryAfterSlot::default();
        let strategy = self.retry.strategy(retry_after.clone());
        let attempts = AtomicU32::new(0);

        let action = || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let retry_after = retry_after.clone();
            async move {
                if attempt > 1 {
                    api_metrics().record_retry();
                }
                self.attempt(spec, attempt, &retry_after).await
            }
        };
        let condition = |error: &IrpError| {
            let retryable = RetryPolicy::is_retryable(error);
            if retryable {
                warn!(method = %spec.method, url = %spec.url, "Retryable failure: {error}");
            }
            retryable
        };

        RetryIf::spawn(strategy, action, condition)
            .await
            .inspect_err(|_| api_metrics().record_error())
    }

    /// One attempt. A 429/503 `Retry-After` is parked in `retry_after` for
    /// the strategy to pick up.
    async fn attempt(
        &self,
        spec: &RequestSpec,
        attempt: u32,
        retry_after: &RetryAfterSlot,
    ) -> Result<ApiResponse, IrpError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        api_metrics().record_request();
        debug!(method = %spec.method, url = %spec.url, attempt, "Sending request");

        let transport = |source: reqwest::Error| IrpError::Transport {
            method: spec.method.to_string(),
            url: spec.url.clone(),
            source,
        };
        let response = self.build(spec).send().await.map_err(transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport)?.to_vec();
        let response = ApiResponse::new(status, headers, body, spec.url.clone());

        if status.is_success() {
            return Ok(response);
        }
        if let Some(after) = RetryPolicy::retry_after_for(status, response.headers()) {
            retry_after.set(after);
        }
        Err(response.into_error(&spec.method))
    }

    fn build(&self, spec: &RequestSpec) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(spec.method.clone(), &spec.url)
            .timeout(spec.timeout.unwrap_or(self.timeout));

        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.as_bytes().to_vec(),
            "https://example.test/x",
        )
    }

    #[test]
    fn json_error_body_is_quoted_verbatim() {
        let err = response(400, r#"{"code":"BAD","message":"nope"}"#).into_error(&Method::POST);
        let rendered = err.to_string();
        assert!(rendered.contains("HTTP 400 from POST https://example.test/x"));
        assert!(rendered.contains(r#"server: {"code":"BAD","message":"nope"}"#));
    }

    #[test]
    fn text_error_body_is_truncated() {
        let long = "x".repeat(2_000);
        let err = response(502, &long).into_error(&Method::GET);
        match err {
            IrpError::Api { detail: Some(detail), status, .. } => {
                assert_eq!(status, 502);
                assert_eq!(detail.len(), "text: ".len() + ERROR_TEXT_LIMIT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_error_body_has_no_detail() {
        let err = response(404, "").into_error(&Method::DELETE);
        assert_eq!(err.to_string(), "HTTP 404 from DELETE https://example.test/x");
    }

    #[test]
    fn location_header_is_exposed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LOCATION,
            HeaderValue::from_static("https://example.test/riskmodeler/v1/workflows/42"),
        );
        let resp = ApiResponse::new(StatusCode::ACCEPTED, headers, Vec::new(), "u");
        assert_eq!(
            resp.location(),
            Some("https://example.test/riskmodeler/v1/workflows/42")
        );
    }

    #[test]
    fn request_spec_collects_query_pairs() {
        let spec = RequestSpec::new(Method::GET, "https://example.test/w")
            .query("ids", "1,2")
            .query("limit", 100)
            .query("offset", 0);
        assert_eq!(
            spec.query,
            vec![
                ("ids".to_string(), "1,2".to_string()),
                ("limit".to_string(), "100".to_string()),
                ("offset".to_string(), "0".to_string()),
            ]
        );
    }
}
