use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::cli::{
    Commands, EdmCommands, JobCommands, PollArgs, PortfolioCommands, RdmCommands, TagCommands,
    WorkflowCommands,
};
use crate::config::IrpConfig;
use crate::riskmodeler::{Client, PollOptions};

pub mod edm;
pub mod job;
pub mod portfolio;
pub mod rdm;
pub mod tag;
pub mod workflow;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Build the API client, reporting progress on stderr so stdout stays JSON.
pub fn connect(config: &IrpConfig) -> Result<Client> {
    eprint!("🔄 Connecting to Risk Modeler at {}... ", config.api.base_url);
    std::io::stderr().flush()?;

    match Client::new(config) {
        Ok(client) => {
            eprintln!("✅");
            Ok(client)
        }
        Err(e) => {
            eprintln!("❌");
            Err(e.into())
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl PollArgs {
    /// Apply the command-line overrides to `defaults`.
    pub fn resolve(&self, defaults: PollOptions) -> PollOptions {
        let mut options = defaults;
        if let Some(secs) = self.interval {
            options = options.with_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        options
    }
}

pub async fn dispatch(command: Commands, config: IrpConfig) -> Result<()> {
    match command {
        Commands::Workflow(WorkflowCommands::Get { id }) => {
            workflow::GetWorkflowCommand { config, id }.execute().await
        }
        Commands::Workflow(WorkflowCommands::Wait { id, poll }) => {
            workflow::WaitWorkflowCommand { config, id, poll }.execute().await
        }
        Commands::Workflow(WorkflowCommands::WaitBatch { ids, poll }) => {
            workflow::WaitBatchCommand { config, ids, poll }.execute().await
        }
        Commands::Job(JobCommands::Wait { kind, ids, poll }) => {
            job::WaitJobsCommand { config, kind, ids, poll }.execute().await
        }
        Commands::Edm(EdmCommands::List { filter }) => {
            edm::ListEdmsCommand { config, filter }.execute().await
        }
        Commands::Portfolio(PortfolioCommands::List { edm, filter }) => {
            portfolio::ListPortfoliosCommand { config, edm, filter }.execute().await
        }
        Commands::Tag(TagCommands::Id { name, create }) => {
            tag::TagIdCommand { config, name, create }.execute().await
        }
        Commands::Rdm(RdmCommands::Export { edm, rdm, analyses, wait, poll }) => {
            rdm::ExportCommand { config, edm, rdm, analyses, wait, poll }.execute().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_overrides_replace_only_given_values() {
        let defaults = PollOptions::single();
        let args = PollArgs {
            interval: Some(2),
            timeout: None,
        };
        let options = args.resolve(defaults);
        assert_eq!(options.interval, Duration::from_secs(2));
        assert_eq!(options.timeout, defaults.timeout);
        assert_eq!(PollArgs::default().resolve(defaults), defaults);
    }
}
