use anyhow::Result;
use serde_json::json;

use super::{connect, print_json, Command};
use crate::cli::PollArgs;
use crate::config::IrpConfig;
use crate::observability::OperationTimer;

pub struct ExportCommand {
    pub config: IrpConfig,
    pub edm: String,
    pub rdm: String,
    pub analyses: Vec<String>,
    pub wait: bool,
    pub poll: PollArgs,
}

impl Command for ExportCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let rdm = client.rdm();
        let submission = rdm.submit_export(&self.edm, &self.rdm, &self.analyses).await?;
        eprintln!("🚀 Export job {} submitted", submission.id);

        if !self.wait {
            return print_json(&submission);
        }

        let timer = OperationTimer::new("rdm export");
        let options = self.poll.resolve(client.poll_options());
        let job = rdm.poll_export_job(submission.id, &options).await?;
        timer.finish();
        print_json(&json!({ "submission": submission, "job": job }))
    }
}
