use reqwest::Method;
use serde_json::{Map, Value};

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::types::{Submission, Treaty};
use super::validators;

pub struct TreatyManager<'a> {
    client: &'a Client,
}

impl<'a> TreatyManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn search(&self, exposure_id: u64, filter: &str) -> Result<Vec<Treaty>, IrpError> {
        validators::positive(exposure_id, "exposure_id")?;
        let mut query = Vec::new();
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        self.client
            .get_json(&endpoints::treaties(exposure_id), &query)
            .await
            .map_err(|e| e.context(format!("Failed to search treaties for exposure ID '{exposure_id}'")))
    }

    pub async fn find_by_name(&self, exposure_id: u64, treaty_name: &str) -> Result<Treaty, IrpError> {
        validators::non_empty(treaty_name, "treaty_name")?;
        let mut found = self.search(exposure_id, &name_filter(treaty_name)).await?;
        if found.len() != 1 {
            return Err(IrpError::Lookup {
                resource: "treaty",
                name: treaty_name.to_string(),
                found: found.len(),
            });
        }
        Ok(found.remove(0))
    }

    /// Create a treaty in the named EDM. `attributes` is the opaque treaty
    /// definition (type, layers, currency, dates...) and must be a JSON object;
    /// `treatyName` is set from `treaty_name`.
    pub async fn create(
        &self,
        edm_name: &str,
        treaty_name: &str,
        attributes: Value,
    ) -> Result<Submission, IrpError> {
        validators::non_empty(treaty_name, "treaty_name")?;
        let mut body: Map<String, Value> = match attributes {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(IrpError::validation(
                    "treaty attributes",
                    format!("must be a JSON object, got {other}"),
                ))
            }
        };

        let edm = self.client.edms().find_by_name(edm_name).await?;
        let existing = self.search(edm.exposure_id, &name_filter(treaty_name)).await?;
        if !existing.is_empty() {
            return Err(IrpError::Duplicate {
                resource: "treaties",
                name: treaty_name.to_string(),
                found: existing.len(),
            });
        }

        body.insert("treatyName".to_string(), Value::String(treaty_name.to_string()));
        let spec = self
            .client
            .request(Method::POST, &endpoints::treaties(edm.exposure_id))
            .json(Value::Object(body));
        self.client
            .submit(spec, "treaty creation")
            .await
            .map_err(|e| e.context(format!("Failed to create treaty '{treaty_name}' in EDM '{edm_name}'")))
    }

    pub async fn delete(&self, edm_name: &str, treaty_name: &str) -> Result<(), IrpError> {
        let edm = self.client.edms().find_by_name(edm_name).await?;
        let treaty = self.find_by_name(edm.exposure_id, treaty_name).await?;
        self.client
            .delete(&endpoints::treaty(edm.exposure_id, treaty.treaty_id))
            .await
            .map_err(|e| e.context(format!("Failed to delete treaty '{treaty_name}'")))?;
        Ok(())
    }
}

fn name_filter(treaty_name: &str) -> String {
    format!("treatyName=\"{treaty_name}\"")
}
