use anyhow::Result;
use tracing::info;

use super::{connect, print_json, Command};
use crate::cli::PollArgs;
use crate::config::IrpConfig;
use crate::observability::OperationTimer;

pub struct GetWorkflowCommand {
    pub config: IrpConfig,
    pub id: u64,
}

impl Command for GetWorkflowCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let workflow = client.get_workflow(self.id).await?;
        print_json(&workflow)
    }
}

pub struct WaitWorkflowCommand {
    pub config: IrpConfig,
    pub id: u64,
    pub poll: PollArgs,
}

impl Command for WaitWorkflowCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let options = self.poll.resolve(client.poll_options());
        let timer = OperationTimer::new("workflow wait");

        let workflow = client.poll_workflow_to_completion(self.id, &options).await?;
        timer.finish();
        info!(
            id = self.id,
            status = %workflow.status,
            elapsed_secs = ?workflow.elapsed().map(|d| d.num_seconds()),
            "Workflow finished"
        );
        print_json(&workflow)
    }
}

pub struct WaitBatchCommand {
    pub config: IrpConfig,
    pub ids: Vec<u64>,
    pub poll: PollArgs,
}

impl Command for WaitBatchCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let options = self.poll.resolve(client.batch_poll_options());
        let timer = OperationTimer::new("workflow batch wait");

        let batch = client
            .poll_workflow_batch_to_completion(&self.ids, &options)
            .await?;
        timer.finish();
        print_json(&batch)
    }
}
