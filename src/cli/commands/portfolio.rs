use anyhow::Result;

use super::{connect, print_json, Command};
use crate::config::IrpConfig;

pub struct ListPortfoliosCommand {
    pub config: IrpConfig,
    pub edm: String,
    pub filter: String,
}

impl Command for ListPortfoliosCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let edm = client.edms().find_by_name(&self.edm).await?;
        let portfolios = client
            .portfolios()
            .search_all(edm.exposure_id, &self.filter)
            .await?;
        eprintln!("📋 {} portfolio(s) in {}", portfolios.len(), edm.exposure_name);
        print_json(&portfolios)
    }
}
