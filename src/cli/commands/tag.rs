use anyhow::{bail, Result};
use serde_json::json;

use super::{connect, print_json, Command};
use crate::config::IrpConfig;

pub struct TagIdCommand {
    pub config: IrpConfig,
    pub name: String,
    pub create: bool,
}

impl Command for TagIdCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let tags = client.tags();

        let (id, created) = match tags.get_tag_id_by_name(&self.name).await? {
            Some(id) => (id, false),
            None if self.create => (tags.create(&self.name).await?, true),
            None => bail!("tag '{}' does not exist (pass --create to create it)", self.name),
        };
        print_json(&json!({ "tagName": self.name, "tagId": id, "created": created }))
    }
}
