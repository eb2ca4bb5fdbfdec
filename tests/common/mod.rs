//! Shared Risk Modeler API mock for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use irp_client::config::IrpConfig;
use irp_client::http::RetryConfig;
use irp_client::riskmodeler::{Client, PollOptions};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";

pub struct RiskModelerMock {
    pub server: MockServer,
}

impl RiskModelerMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Config pointing at the mock, with millisecond backoff.
    pub fn config(&self) -> IrpConfig {
        let mut config = IrpConfig::default();
        config.api.base_url = self.server.uri();
        config.api.api_key = Some(API_KEY.to_string());
        config.api.request_timeout_secs = 5;
        config.retry = RetryConfig {
            backoff_base_ms: 1,
            ..RetryConfig::default()
        };
        config
    }

    pub fn client(&self) -> Client {
        Client::new(&self.config()).expect("client for mock server")
    }

    /// Absolute URL of a path on the mock, as a `Location` header carries it.
    pub fn location(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    pub async fn mock_get(&self, at: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(at.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// POST answering 201 with a `Location` header ending in `id`.
    pub async fn mock_created(&self, at: &str, id: u64) {
        Mock::given(method("POST"))
            .and(path(at.to_string()))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("Location", self.location(&format!("{at}/{id}")).as_str()),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_edm(&self, name: &str, exposure_id: u64) {
        self.mock_get(
            "/platform/riskdata/v1/exposures",
            json!([{ "exposureId": exposure_id, "exposureName": name }]),
        )
        .await;
    }

    /// Bodies of every request received so far for `at`.
    pub async fn bodies_for(&self, http_method: &str, at: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == at)
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }
}

pub fn workflow(id: u64, status: &str) -> Value {
    json!({
        "id": id,
        "name": format!("workflow-{id}"),
        "type": "job",
        "status": status,
        "submitTime": "2024-05-01T10:00:00Z"
    })
}

/// Short interval and timeout for polling tests.
pub fn fast_poll() -> PollOptions {
    PollOptions::single()
        .with_interval(Duration::from_millis(10))
        .with_timeout(Duration::from_secs(5))
}
