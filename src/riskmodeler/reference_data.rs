use serde_json::Value;

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::utils::{find_reference_data_by_name, list_items};
use super::validators;

/// Read-only lookups of analysis settings and reference tables.
pub struct ReferenceDataManager<'a> {
    client: &'a Client,
}

impl<'a> ReferenceDataManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn list(&self, path: &str, data_type: &str) -> Result<Vec<Value>, IrpError> {
        let body: Value = self
            .client
            .get_json(path, &[])
            .await
            .map_err(|e| e.context(format!("Failed to list {data_type}s")))?;
        Ok(list_items(body))
    }

    async fn find(
        &self,
        path: &str,
        name: &str,
        name_field: &str,
        data_type: &str,
    ) -> Result<Value, IrpError> {
        validators::non_empty(name, data_type)?;
        let items = self.list(path, data_type).await?;
        find_reference_data_by_name(&items, name, name_field, data_type).cloned()
    }

    pub async fn model_profiles(&self) -> Result<Vec<Value>, IrpError> {
        self.list(endpoints::MODEL_PROFILES, "model profile").await
    }

    pub async fn output_profiles(&self) -> Result<Vec<Value>, IrpError> {
        self.list(endpoints::OUTPUT_PROFILES, "output profile").await
    }

    pub async fn event_rate_schemes(&self) -> Result<Vec<Value>, IrpError> {
        self.list(endpoints::EVENT_RATE_SCHEMES, "event rate scheme").await
    }

    pub async fn currencies(&self) -> Result<Vec<Value>, IrpError> {
        self.list(endpoints::CURRENCIES, "currency").await
    }

    pub async fn data_servers(&self) -> Result<Vec<Value>, IrpError> {
        self.list(endpoints::DATA_SERVERS, "data server").await
    }

    pub async fn model_profile(&self, name: &str) -> Result<Value, IrpError> {
        self.find(endpoints::MODEL_PROFILES, name, "name", "model profile").await
    }

    pub async fn output_profile(&self, name: &str) -> Result<Value, IrpError> {
        self.find(endpoints::OUTPUT_PROFILES, name, "name", "output profile").await
    }

    pub async fn event_rate_scheme(&self, name: &str) -> Result<Value, IrpError> {
        self.find(
            endpoints::EVENT_RATE_SCHEMES,
            name,
            "eventRateSchemeName",
            "event rate scheme",
        )
        .await
    }

    pub async fn currency(&self, code: &str) -> Result<Value, IrpError> {
        self.find(endpoints::CURRENCIES, code, "code", "currency").await
    }

    pub async fn data_server(&self, name: &str) -> Result<Value, IrpError> {
        self.find(endpoints::DATA_SERVERS, name, "serverName", "data server").await
    }
}
