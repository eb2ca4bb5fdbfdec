use serde_json::json;
use tracing::info;

use super::client::Client;
use super::endpoints;
use super::errors::IrpError;
use super::types::Tag;
use super::utils;
use super::validators;

pub struct TagManager<'a> {
    client: &'a Client,
}

impl<'a> TagManager<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn search(&self, filter: &str) -> Result<Vec<Tag>, IrpError> {
        let mut query = Vec::new();
        if !filter.is_empty() {
            query.push(("filter", filter.to_string()));
        }
        self.client
            .get_json(endpoints::TAGS, &query)
            .await
            .map_err(|e| e.context(format!("Failed to search tags with filter '{filter}'")))
    }

    /// Id of the tag with exactly this name, if one exists. Read-only.
    pub async fn get_tag_id_by_name(&self, name: &str) -> Result<Option<u64>, IrpError> {
        validators::non_empty(name, "tag_name")?;
        let tags = self.search(&format!("tagName=\"{name}\"")).await?;
        Ok(tags
            .into_iter()
            .find(|tag| tag.tag_name == name)
            .map(|tag| tag.tag_id))
    }

    pub async fn create(&self, name: &str) -> Result<u64, IrpError> {
        validators::non_empty(name, "tag_name")?;
        let response = self
            .client
            .post_json(endpoints::TAGS, json!({ "tagName": name }))
            .await
            .map_err(|e| e.context(format!("Failed to create tag '{name}'")))?;
        let id = utils::workflow_id_from_location(&response, "tag creation")?;
        info!(tag = name, id, "Created tag");
        Ok(id)
    }

    /// Ids for every name, creating the tags that do not exist yet. Order
    /// follows `names`.
    pub async fn get_or_create_many(&self, names: &[String]) -> Result<Vec<u64>, IrpError> {
        validators::non_empty_list(names, "tag_names")?;
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = match self.get_tag_id_by_name(name).await? {
                Some(id) => id,
                None => self.create(name).await?,
            };
            ids.push(id);
        }
        Ok(ids)
    }
}
