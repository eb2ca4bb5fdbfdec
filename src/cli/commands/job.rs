use anyhow::Result;

use super::{connect, print_json, Command};
use crate::cli::PollArgs;
use crate::config::IrpConfig;
use crate::observability::OperationTimer;
use crate::riskmodeler::JobKind;

pub struct WaitJobsCommand {
    pub config: IrpConfig,
    pub kind: JobKind,
    pub ids: Vec<u64>,
    pub poll: PollArgs,
}

impl Command for WaitJobsCommand {
    async fn execute(&self) -> Result<()> {
        let client = connect(&self.config)?;
        let timer = OperationTimer::new("job wait");

        if let &[id] = self.ids.as_slice() {
            let options = self.poll.resolve(client.poll_options());
            let job = client.poll_job_to_completion(self.kind, id, &options).await?;
            timer.finish();
            return print_json(&job);
        }

        let options = self.poll.resolve(client.batch_poll_options());
        let jobs = client
            .poll_job_batch_to_completion(self.kind, &self.ids, &options)
            .await?;
        timer.finish();
        print_json(&jobs)
    }
}
