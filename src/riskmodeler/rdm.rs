use reqwest::Method;
use serde_json::json;

use super::analysis::analysis_uri;
use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::jobs::JobKind;
use super::types::Submission;
use super::validators;
use super::workflows::{PollOptions, Workflow};

/// Results export to a Results Data Mart.
pub struct RdmManager<'a> {
    client: &'a Client,
}

impl<'a> RdmManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Export the named analyses of one EDM into `rdm_name`.
    pub async fn submit_export(
        &self,
        edm_name: &str,
        rdm_name: &str,
        analysis_names: &[String],
    ) -> Result<Submission, IrpError> {
        validators::non_empty(rdm_name, "rdm_name")?;
        validators::non_empty_list(analysis_names, "analysis_names")?;

        let analyses = self.client.analyses();
        let mut uris = Vec::with_capacity(analysis_names.len());
        for name in analysis_names {
            let analysis = analyses.find_by_name(edm_name, name).await?;
            uris.push(analysis_uri(&analysis));
        }

        let body = json!({
            "exportType": "RDM",
            "resourceType": "analyses",
            "resourceUris": uris,
            "settings": { "rdmName": rdm_name },
        });
        let spec = self
            .client
            .request(Method::POST, &endpoints::jobs(JobKind::Export.service()))
            .json(body);
        self.client
            .submit(spec, "RDM export submission")
            .await
            .map_err(|e| e.context(format!("Failed to export analyses to RDM '{rdm_name}'")))
    }

    pub async fn poll_export_job(&self, job_id: u64, options: &PollOptions) -> Result<Workflow, IrpError> {
        self.client
            .poll_job_to_completion(JobKind::Export, job_id, options)
            .await
    }
}
