use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map};
use tracing::info;

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::jobs::JobKind;
use super::types::{Analysis, Submission};
use super::utils::{self, reference_id};
use super::validators;
use super::workflows::Workflow;

/// Model run of one portfolio. Names are resolved to ids before submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelJobRequest {
    pub edm_name: String,
    pub portfolio_name: String,
    pub analysis_name: String,
    pub model_profile: String,
    pub output_profile: String,
    #[serde(default)]
    pub event_rate_scheme: Option<String>,
    #[serde(default)]
    pub treaty_names: Vec<String>,
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

pub struct AnalysisManager<'a> {
    client: &'a Client,
}

impl<'a> AnalysisManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn search(&self, filter: &str) -> Result<Vec<Analysis>, IrpError> {
        let mut query = Vec::new();
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        self.client
            .get_json(endpoints::ANALYSES, &query)
            .await
            .map_err(|e| e.context(format!("Failed to search analyses with filter '{filter}'")))
    }

    /// The single analysis with this name in the given EDM.
    pub async fn find_by_name(&self, edm_name: &str, analysis_name: &str) -> Result<Analysis, IrpError> {
        validators::non_empty(edm_name, "edm_name")?;
        validators::non_empty(analysis_name, "analysis_name")?;
        let filter = format!("analysisName=\"{analysis_name}\" AND exposureName=\"{edm_name}\"");
        let mut found = self.search(&filter).await?;
        if found.len() != 1 {
            return Err(IrpError::Lookup {
                resource: "analysis",
                name: format!("{edm_name}/{analysis_name}"),
                found: found.len(),
            });
        }
        Ok(found.remove(0))
    }

    pub async fn submit_model_job(&self, request: &ModelJobRequest) -> Result<Submission, IrpError> {
        validators::non_empty(&request.analysis_name, "analysis_name")?;
        validators::non_empty(&request.model_profile, "model_profile")?;
        validators::non_empty(&request.output_profile, "output_profile")?;

        let edm = self.client.edms().find_by_name(&request.edm_name).await?;
        let existing = self
            .search(&format!(
                "analysisName=\"{}\" AND exposureName=\"{}\"",
                request.analysis_name, request.edm_name
            ))
            .await?;
        if !existing.is_empty() {
            return Err(IrpError::Duplicate {
                resource: "analyses",
                name: request.analysis_name.clone(),
                found: existing.len(),
            });
        }

        let portfolio = self
            .client
            .portfolios()
            .find_by_name(edm.exposure_id, &request.portfolio_name)
            .await?;
        let portfolio_uri = portfolio.uri.ok_or_else(|| {
            IrpError::malformed(format!("portfolio '{}'", request.portfolio_name), "missing 'uri'")
        })?;

        let reference = self.client.reference_data();
        let model_profile = reference.model_profile(&request.model_profile).await?;
        let output_profile = reference.output_profile(&request.output_profile).await?;

        let mut settings = Map::new();
        settings.insert("name".into(), json!(request.analysis_name));
        settings.insert(
            "modelProfileId".into(),
            json!(reference_id(&model_profile, "id", "model profile")?),
        );
        settings.insert(
            "outputProfileId".into(),
            json!(reference_id(&output_profile, "id", "output profile")?),
        );

        if let Some(scheme_name) = &request.event_rate_scheme {
            let scheme = reference.event_rate_scheme(scheme_name).await?;
            settings.insert(
                "eventRateSchemeId".into(),
                json!(reference_id(&scheme, "eventRateSchemeId", "event rate scheme")?),
            );
        }

        if let Some(code) = &request.currency {
            let currency = reference.currency(code).await?;
            settings.insert("currency".into(), currency);
        }

        if !request.treaty_names.is_empty() {
            let treaties = self.client.treaties();
            let mut treaty_ids = Vec::with_capacity(request.treaty_names.len());
            for name in &request.treaty_names {
                treaty_ids.push(treaties.find_by_name(edm.exposure_id, name).await?.treaty_id);
            }
            settings.insert("treaties".into(), json!(treaty_ids));
        }

        if !request.tag_names.is_empty() {
            let tag_ids = self.client.tags().get_or_create_many(&request.tag_names).await?;
            settings.insert("tagIds".into(), json!(tag_ids));
        }

        let body = json!({
            "resourceUri": portfolio_uri,
            "resourceType": "portfolio",
            "settings": settings,
        });
        let spec = self
            .client
            .request(Method::POST, &endpoints::jobs(JobKind::Model.service()))
            .json(body);
        let submission = self
            .client
            .submit(spec, "model job submission")
            .await
            .map_err(|e| {
                e.context(format!(
                    "Failed to submit model job for analysis '{}'",
                    request.analysis_name
                ))
            })?;
        info!(analysis = %request.analysis_name, job_id = submission.id, "Model job submitted");
        Ok(submission)
    }

    /// Group existing analyses (each named `edm/analysis`) into a new
    /// analysis group.
    pub async fn submit_grouping_job(
        &self,
        group_name: &str,
        members: &[(String, String)],
    ) -> Result<Submission, IrpError> {
        validators::non_empty(group_name, "group_name")?;
        validators::non_empty_list(members, "analyses")?;

        let mut uris = Vec::with_capacity(members.len());
        for (edm_name, analysis_name) in members {
            let analysis = self.find_by_name(edm_name, analysis_name).await?;
            uris.push(analysis_uri(&analysis));
        }

        let body = json!({
            "resourceType": "analyses",
            "resourceUris": uris,
            "settings": { "analysisName": group_name },
        });
        let spec = self
            .client
            .request(Method::POST, &endpoints::jobs(JobKind::Grouping.service()))
            .json(body);
        self.client
            .submit(spec, "grouping job submission")
            .await
            .map_err(|e| e.context(format!("Failed to submit grouping job '{group_name}'")))
    }

    pub async fn delete(&self, analysis_id: u64) -> Result<(), IrpError> {
        validators::positive(analysis_id, "analysis_id")?;
        self.client
            .delete(&endpoints::analysis(analysis_id))
            .await
            .map_err(|e| e.context(format!("Failed to delete analysis {analysis_id}")))?;
        Ok(())
    }

    pub fn analysis_id_from_workflow(&self, workflow: &Workflow) -> Result<u64, IrpError> {
        utils::analysis_id_from_workflow(workflow)
    }
}

/// Server-provided URI, or the canonical one built from the id.
pub(crate) fn analysis_uri(analysis: &Analysis) -> String {
    analysis
        .uri
        .clone()
        .unwrap_or_else(|| endpoints::analysis(analysis.analysis_id))
}
