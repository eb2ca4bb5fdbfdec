use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::jobs::JobKind;
use super::types::{Account, Portfolio, Submission};
use super::validators;
use super::workflows::{PollOptions, Workflow};

pub const PAGE_SIZE: usize = 100;
/// The API rejects longer portfolio numbers.
pub const MAX_PORTFOLIO_NUMBER_LEN: usize = 20;
pub const DEFAULT_GEOHAZ_VERSION: &str = "22.0";

/// One portfolio to create, as read from a job definition.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPortfolio {
    pub edm_name: String,
    pub portfolio_name: String,
    #[serde(default = "default_portfolio_number")]
    pub portfolio_number: String,
    #[serde(default)]
    pub description: String,
}

fn default_portfolio_number() -> String {
    "1".to_string()
}

/// Geocoding plus optional hazard layers for one portfolio.
#[derive(Debug, Clone, Deserialize)]
pub struct GeohazRequest {
    pub edm_name: String,
    pub portfolio_name: String,
    #[serde(default = "default_geohaz_version")]
    pub version: String,
    #[serde(default)]
    pub hazard_eq: bool,
    #[serde(default)]
    pub hazard_ws: bool,
    #[serde(default)]
    pub geocode_layer_options: Option<Value>,
    #[serde(default)]
    pub hazard_layer_options: Option<Value>,
}

fn default_geohaz_version() -> String {
    DEFAULT_GEOHAZ_VERSION.to_string()
}

impl GeohazRequest {
    pub fn new(edm_name: impl Into<String>, portfolio_name: impl Into<String>) -> Self {
        Self {
            edm_name: edm_name.into(),
            portfolio_name: portfolio_name.into(),
            version: default_geohaz_version(),
            hazard_eq: false,
            hazard_ws: false,
            geocode_layer_options: None,
            hazard_layer_options: None,
        }
    }

    /// Job body for the given portfolio URI.
    pub fn body(&self, portfolio_uri: &str) -> Value {
        let geocode_options = self.geocode_layer_options.clone().unwrap_or_else(|| {
            json!({
                "aggregateTriggerEnabled": "true",
                "geoLicenseType": "0",
                "skipPrevGeocoded": false
            })
        });
        let hazard_options = self.hazard_layer_options.clone().unwrap_or_else(|| {
            json!({
                "overrideUserDef": false,
                "skipPrevHazard": false
            })
        });

        let mut layers = vec![json!({
            "type": "geocode",
            "name": "geocode",
            "engineType": "RL",
            "version": self.version,
            "layerOptions": geocode_options
        })];
        for (enabled, name) in [(self.hazard_eq, "earthquake"), (self.hazard_ws, "windstorm")] {
            if enabled {
                layers.push(json!({
                    "type": "hazard",
                    "name": name,
                    "engineType": "RL",
                    "version": self.version,
                    "layerOptions": hazard_options
                }));
            }
        }

        json!({
            "resourceUri": portfolio_uri,
            "resourceType": "portfolio",
            "settings": { "layers": layers }
        })
    }
}

pub struct PortfolioManager<'a> {
    client: &'a Client,
}

impl<'a> PortfolioManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn search(
        &self,
        exposure_id: u64,
        filter: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Portfolio>, IrpError> {
        validators::positive(exposure_id, "exposure_id")?;
        let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        self.client
            .get_json(&endpoints::portfolios(exposure_id), &query)
            .await
            .map_err(|e| {
                e.context(format!(
                    "Failed to search portfolios for exposure ID '{exposure_id}'"
                ))
            })
    }

    /// Every matching portfolio, fetched a page at a time until a short page.
    pub async fn search_all(&self, exposure_id: u64, filter: &str) -> Result<Vec<Portfolio>, IrpError> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.search(exposure_id, filter, PAGE_SIZE, offset).await?;
            let short = page.len() < PAGE_SIZE;
            all.extend(page);
            if short {
                return Ok(all);
            }
            offset += PAGE_SIZE;
        }
    }

    /// The single portfolio with this exact name inside an EDM.
    pub async fn find_by_name(&self, exposure_id: u64, portfolio_name: &str) -> Result<Portfolio, IrpError> {
        validators::non_empty(portfolio_name, "portfolio_name")?;
        let mut found = self
            .search(exposure_id, &name_filter(portfolio_name), PAGE_SIZE, 0)
            .await?;
        if found.len() != 1 {
            return Err(IrpError::Lookup {
                resource: "portfolio",
                name: portfolio_name.to_string(),
                found: found.len(),
            });
        }
        Ok(found.remove(0))
    }

    pub async fn accounts(&self, exposure_id: u64, portfolio_id: u64) -> Result<Vec<Account>, IrpError> {
        validators::positive(exposure_id, "exposure_id")?;
        validators::positive(portfolio_id, "portfolio_id")?;
        self.client
            .get_json(&endpoints::portfolio_accounts(exposure_id, portfolio_id), &[])
            .await
            .map_err(|e| {
                e.context(format!(
                    "Failed to search accounts for exposure ID '{exposure_id}' and portfolio ID '{portfolio_id}'"
                ))
            })
    }

    /// Create a portfolio in the named EDM. The name must not be taken and
    /// the number is cut to 20 characters. The returned id is the portfolio id.
    pub async fn create(&self, new: &NewPortfolio) -> Result<Submission, IrpError> {
        validators::non_empty(&new.edm_name, "edm_name")?;
        validators::non_empty(&new.portfolio_name, "portfolio_name")?;
        validators::non_empty(&new.portfolio_number, "portfolio_number")?;

        let edm = self.client.edms().find_by_name(&new.edm_name).await?;
        let existing = self
            .search(edm.exposure_id, &name_filter(&new.portfolio_name), PAGE_SIZE, 0)
            .await?;
        if !existing.is_empty() {
            return Err(IrpError::Duplicate {
                resource: "portfolios",
                name: new.portfolio_name.clone(),
                found: existing.len(),
            });
        }

        let body = json!({
            "portfolioName": new.portfolio_name,
            "portfolioNumber": truncate_chars(&new.portfolio_number, MAX_PORTFOLIO_NUMBER_LEN),
            "description": new.description,
        });
        let spec = self
            .client
            .request(Method::POST, &endpoints::portfolios(edm.exposure_id))
            .json(body);
        self.client
            .submit(spec, "portfolio creation")
            .await
            .map_err(|e| {
                e.context(format!(
                    "Failed to create portfolio '{}' in exposure id '{}'",
                    new.portfolio_name, edm.exposure_id
                ))
            })
    }

    pub async fn create_many(&self, portfolios: &[NewPortfolio]) -> Result<Vec<u64>, IrpError> {
        validators::non_empty_list(portfolios, "portfolios")?;
        let mut ids = Vec::with_capacity(portfolios.len());
        for new in portfolios {
            ids.push(self.create(new).await?.id);
        }
        Ok(ids)
    }

    /// Submit a geohaz job. Portfolios without accounts, or whose accounts
    /// hold no locations, are rejected before anything is sent.
    pub async fn submit_geohaz(&self, request: &GeohazRequest) -> Result<Submission, IrpError> {
        validators::non_empty(&request.edm_name, "edm_name")?;
        validators::non_empty(&request.portfolio_name, "portfolio_name")?;
        validators::non_empty(&request.version, "version")?;

        let edm = self.client.edms().find_by_name(&request.edm_name).await?;
        let portfolio = self
            .find_by_name(edm.exposure_id, &request.portfolio_name)
            .await?;
        let uri = portfolio.uri.as_deref().ok_or_else(|| {
            IrpError::malformed(
                format!("portfolio '{}'", request.portfolio_name),
                "missing 'uri'",
            )
        })?;

        let accounts = self.accounts(edm.exposure_id, portfolio.portfolio_id).await?;
        if accounts.is_empty() {
            return Err(IrpError::Precondition(format!(
                "Portfolio '{}' does not have any accounts or locations to geohaz",
                request.portfolio_name
            )));
        }
        if accounts.iter().all(|account| account.locations_count == 0) {
            return Err(IrpError::Precondition(format!(
                "Portfolio '{}' has accounts but no locations to geohaz",
                request.portfolio_name
            )));
        }

        let spec = self
            .client
            .request(Method::POST, &endpoints::jobs(JobKind::Geohaz.service()))
            .json(request.body(uri));
        let submission = self
            .client
            .submit(spec, "portfolio geohaz")
            .await
            .map_err(|e| e.context(format!("Failed to submit geohaz for portfolio '{uri}'")))?;
        info!(
            portfolio = %request.portfolio_name,
            job_id = submission.id,
            "Geohaz job submitted"
        );
        Ok(submission)
    }

    pub async fn submit_geohaz_many(&self, requests: &[GeohazRequest]) -> Result<Vec<u64>, IrpError> {
        validators::non_empty_list(requests, "geohaz_requests")?;
        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            ids.push(self.submit_geohaz(request).await?.id);
        }
        Ok(ids)
    }

    pub async fn get_geohaz_job(&self, job_id: u64) -> Result<Workflow, IrpError> {
        self.client.get_job(JobKind::Geohaz, job_id).await
    }

    pub async fn poll_geohaz_job_to_completion(
        &self,
        job_id: u64,
        options: &PollOptions,
    ) -> Result<Workflow, IrpError> {
        self.client
            .poll_job_to_completion(JobKind::Geohaz, job_id, options)
            .await
    }

    pub async fn poll_geohaz_job_batch_to_completion(
        &self,
        job_ids: &[u64],
        options: &PollOptions,
    ) -> Result<Vec<Workflow>, IrpError> {
        self.client
            .poll_job_batch_to_completion(JobKind::Geohaz, job_ids, options)
            .await
    }
}

fn name_filter(portfolio_name: &str) -> String {
    format!("portfolioName=\"{portfolio_name}\"")
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geohaz_body_has_geocode_layer_only_by_default() {
        let body = GeohazRequest::new("EDM", "P").body("/platform/riskdata/v1/exposures/1/portfolios/2");
        let layers = body["settings"]["layers"].as_array().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0]["type"], "geocode");
        assert_eq!(layers[0]["version"], DEFAULT_GEOHAZ_VERSION);
        assert_eq!(layers[0]["layerOptions"]["geoLicenseType"], "0");
        assert_eq!(body["resourceType"], "portfolio");
    }

    #[test]
    fn hazard_layers_follow_flags() {
        let mut request = GeohazRequest::new("EDM", "P");
        request.hazard_eq = true;
        request.hazard_ws = true;
        request.version = "23.0".to_string();
        request.hazard_layer_options = Some(json!({"overrideUserDef": true}));

        let body = request.body("uri");
        let names: Vec<&str> = body["settings"]["layers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["geocode", "earthquake", "windstorm"]);
        assert_eq!(body["settings"]["layers"][2]["layerOptions"]["overrideUserDef"], true);
        assert_eq!(body["settings"]["layers"][1]["version"], "23.0");
    }

    #[test]
    fn portfolio_numbers_are_cut_on_char_boundaries() {
        assert_eq!(truncate_chars("ABCDEFGHIJKLMNOPQRSTUVWXYZ", 20), "ABCDEFGHIJKLMNOPQRST");
        assert_eq!(truncate_chars("short", 20), "short");
        assert_eq!(truncate_chars(&"é".repeat(25), 20).chars().count(), 20);
    }

    #[test]
    fn new_portfolio_defaults() {
        let parsed: NewPortfolio =
            serde_json::from_value(json!({"edm_name": "E", "portfolio_name": "P"})).unwrap();
        assert_eq!(parsed.portfolio_number, "1");
        assert_eq!(parsed.description, "");
    }
}
