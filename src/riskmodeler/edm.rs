use reqwest::Method;
use serde_json::{json, Value};

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::types::{Edm, Submission};
use super::utils::reference_id;
use super::validators;

pub struct EdmManager<'a> {
    client: &'a Client,
}

impl<'a> EdmManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn search(&self, filter: &str) -> Result<Vec<Edm>, IrpError> {
        let mut query = Vec::new();
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        self.client
            .get_json(endpoints::EXPOSURES, &query)
            .await
            .map_err(|e| e.context(format!("Failed to search EDMs with filter '{filter}'")))
    }

    /// The single EDM with this exact name.
    pub async fn find_by_name(&self, edm_name: &str) -> Result<Edm, IrpError> {
        validators::non_empty(edm_name, "edm_name")?;
        let mut edms = self
            .search(&format!("exposureName=\"{edm_name}\""))
            .await?;
        if edms.len() != 1 {
            return Err(IrpError::Lookup {
                resource: "EDM",
                name: edm_name.to_string(),
                found: edms.len(),
            });
        }
        Ok(edms.remove(0))
    }

    pub async fn data_servers(&self) -> Result<Vec<Value>, IrpError> {
        self.client.reference_data().data_servers().await
    }

    /// Start creating an EDM on the named data server. The returned id is the
    /// creation workflow.
    pub async fn submit_create(&self, edm_name: &str, server_name: &str) -> Result<Submission, IrpError> {
        validators::non_empty(edm_name, "edm_name")?;
        validators::non_empty(server_name, "server_name")?;

        let existing = self
            .search(&format!("exposureName=\"{edm_name}\""))
            .await?;
        if !existing.is_empty() {
            return Err(IrpError::Duplicate {
                resource: "EDMs",
                name: edm_name.to_string(),
                found: existing.len(),
            });
        }

        let server = self.client.reference_data().data_server(server_name).await?;
        let server_id = reference_id(&server, "serverId", "data server")?;

        let body = json!({
            "exposureName": edm_name,
            "serverId": server_id,
        });
        let spec = self.client.request(Method::POST, endpoints::EXPOSURES).json(body);
        self.client
            .submit(spec, "EDM creation")
            .await
            .map_err(|e| e.context(format!("Failed to create EDM '{edm_name}'")))
    }

    /// Start deleting the named EDM. The returned id is the deletion workflow.
    pub async fn submit_delete(&self, edm_name: &str) -> Result<Submission, IrpError> {
        let edm = self.find_by_name(edm_name).await?;
        let spec = self
            .client
            .request(Method::DELETE, &endpoints::exposure(edm.exposure_id));
        self.client
            .submit(spec, "EDM deletion")
            .await
            .map_err(|e| e.context(format!("Failed to delete EDM '{edm_name}'")))
    }
}
