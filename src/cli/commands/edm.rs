use anyhow::Result;

use super::{connect, print_json, Command};
use crate::config::IrpConfig;

pub struct ListEdmsCommand {
    pub config: IrpConfig,
    pub filter: String,
}

impl Command for ListEdmsCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let edms = client.edms().search(&self.filter).await?;
        eprintln!("📋 {} EDM(s)", edms.len());
        print_json(&edms)
    }
}
