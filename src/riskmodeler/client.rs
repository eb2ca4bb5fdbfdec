use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use super::errors::IrpError;
use super::types::Submission;
use super::utils;
use super::workflows::{PollOptions, Workflow};
use super::{
    AnalysisManager, EdmManager, MriImportManager, PortfolioManager, RdmManager,
    ReferenceDataManager, TagManager, TreatyManager,
};
use crate::config::{IrpConfig, PollingConfig, PLACEHOLDER_API_KEY};
use crate::http::{ApiResponse, HttpSession, RequestSpec, SessionConfig};

pub const RESOURCE_GROUP_HEADER: &str = "x-rms-resource-group-id";

/// Outcome of [`Client::execute_workflow`].
#[derive(Debug)]
pub enum WorkflowExecution {
    /// The server answered without starting a workflow (anything but 201/202).
    Immediate(ApiResponse),
    /// The workflow named by the `Location` header ran to FINISHED.
    Completed(Workflow),
}

/// Risk Modeler API client: base URL resolution, authenticated session and
/// workflow helpers. Resource managers borrow it.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    session: HttpSession,
    polling: PollingConfig,
}

impl Client {
    pub fn new(config: &IrpConfig) -> Result<Self, IrpError> {
        let api = &config.api;
        let api_key = api
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| IrpError::Config("RISK_MODELER_API_KEY is not set".to_string()))?;
        if api_key == PLACEHOLDER_API_KEY {
            return Err(IrpError::Config(
                "RISK_MODELER_API_KEY still holds the placeholder value".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(api_key)
            .map_err(|_| IrpError::Config("RISK_MODELER_API_KEY is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        if let Some(group) = api.resource_group_id.as_deref().filter(|g| !g.trim().is_empty()) {
            let value = HeaderValue::from_str(group.trim()).map_err(|_| {
                IrpError::Config("RISK_MODELER_RESOURCE_GROUP_ID is not a valid header value".to_string())
            })?;
            headers.insert(HeaderName::from_static(RESOURCE_GROUP_HEADER), value);
        }

        let session = HttpSession::new(SessionConfig {
            default_headers: headers,
            timeout: api.request_timeout(),
            retry: config.retry.clone(),
            requests_per_second: api.requests_per_second,
        })?;

        Ok(Self {
            base_url: api.base_url.trim_end_matches('/').to_string(),
            session,
            polling: config.polling.clone(),
        })
    }

    /// Build a client from .env, irp.toml and the environment.
    pub fn from_env() -> Result<Self, IrpError> {
        IrpConfig::load_env_file().map_err(|e| IrpError::Config(e.to_string()))?;
        let config = IrpConfig::load().map_err(|e| IrpError::Config(e.to_string()))?;
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default options for single workflow/job polls.
    pub fn poll_options(&self) -> PollOptions {
        self.polling.single()
    }

    /// Default options for batch polls.
    pub fn batch_poll_options(&self) -> PollOptions {
        self.polling.batch()
    }

    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestSpec {
        RequestSpec::new(method, self.url(path))
    }

    /// Request against another base URL, e.g. a storage bucket URL.
    pub fn request_at(&self, method: Method, base_url: &str, path: &str) -> RequestSpec {
        RequestSpec::new(method, join_url(base_url, path))
    }

    /// Request against an absolute URL, e.g. a `Location` header.
    pub fn request_url(&self, method: Method, full_url: &str) -> RequestSpec {
        RequestSpec::new(method, full_url)
    }

    pub async fn send(&self, spec: &RequestSpec) -> Result<ApiResponse, IrpError> {
        self.session.send(spec).await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T, IrpError> {
        self.send(spec).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, IrpError> {
        let spec = query
            .iter()
            .fold(self.request(Method::GET, path), |spec, (key, value)| {
                spec.query(*key, value)
            });
        self.send_json(&spec).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<ApiResponse, IrpError> {
        self.send(&self.request(Method::POST, path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, IrpError> {
        self.send(&self.request(Method::DELETE, path)).await
    }

    /// Send a request that starts asynchronous work and return the id from
    /// its `Location` header together with the body that was sent.
    pub async fn submit(&self, spec: RequestSpec, context: &str) -> Result<Submission, IrpError> {
        let response = self.send(&spec).await?;
        let id = utils::workflow_id_from_location(&response, context)?;
        info!(id, %context, "Submitted");
        Ok(Submission {
            id,
            request: spec.body.unwrap_or(Value::Null),
        })
    }

    /// Submit and, when the server answers 201/202, poll the `Location`
    /// workflow to completion.
    pub async fn execute_workflow(
        &self,
        spec: RequestSpec,
        options: &PollOptions,
    ) -> Result<WorkflowExecution, IrpError> {
        info!(method = %spec.method, url = %spec.url, "Submitting workflow request");
        let response = self.send(&spec).await?;

        if !matches!(response.status(), StatusCode::CREATED | StatusCode::ACCEPTED) {
            return Ok(WorkflowExecution::Immediate(response));
        }

        let location = utils::location_header(&response, "workflow submission")?;
        let workflow = self.poll_workflow(location, options).await?;
        Ok(WorkflowExecution::Completed(workflow))
    }

    pub fn edms(&self) -> EdmManager<'_> {
        EdmManager::new(self)
    }

    pub fn portfolios(&self) -> PortfolioManager<'_> {
        PortfolioManager::new(self)
    }

    pub fn treaties(&self) -> TreatyManager<'_> {
        TreatyManager::new(self)
    }

    pub fn analyses(&self) -> AnalysisManager<'_> {
        AnalysisManager::new(self)
    }

    pub fn tags(&self) -> TagManager<'_> {
        TagManager::new(self)
    }

    pub fn reference_data(&self) -> ReferenceDataManager<'_> {
        ReferenceDataManager::new(self)
    }

    pub fn rdm(&self) -> RdmManager<'_> {
        RdmManager::new(self)
    }

    pub fn mri_import(&self) -> MriImportManager<'_> {
        MriImportManager::new(self)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key(key: Option<&str>) -> IrpConfig {
        let mut config = IrpConfig::default();
        config.api.api_key = key.map(str::to_string);
        config.api.base_url = "https://api.test/".to_string();
        config
    }

    #[test]
    fn urls_are_joined_with_a_single_slash() {
        let client = Client::new(&config_with_key(Some("k"))).unwrap();
        assert_eq!(client.base_url(), "https://api.test");
        assert_eq!(
            client.url("/riskmodeler/v1/workflows"),
            "https://api.test/riskmodeler/v1/workflows"
        );
        assert_eq!(client.url("tags"), "https://api.test/tags");
        assert_eq!(
            client.request_at(Method::POST, "https://bucket.test/storage/9/", "path").url,
            "https://bucket.test/storage/9/path"
        );
        assert_eq!(
            client.request_url(Method::GET, "https://x.test/w/1").url,
            "https://x.test/w/1"
        );
    }

    #[test]
    fn missing_or_placeholder_key_is_a_config_error() {
        assert!(matches!(
            Client::new(&config_with_key(None)),
            Err(IrpError::Config(_))
        ));
        assert!(matches!(
            Client::new(&config_with_key(Some("  "))),
            Err(IrpError::Config(_))
        ));
        let err = Client::new(&config_with_key(Some(PLACEHOLDER_API_KEY))).unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }
}
