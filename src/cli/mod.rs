use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::riskmodeler::JobKind;

pub mod commands;

#[derive(Parser)]
#[command(name = "irp")]
#[command(about = "Moody's Risk Modeler API client with workflow polling")]
#[command(long_about = "irp talks to the Risk Modeler / Intelligent Risk Platform REST API. \
                       Credentials come from RISK_MODELER_API_KEY, RISK_MODELER_BASE_URL and \
                       RISK_MODELER_RESOURCE_GROUP_ID (environment or .env). Results are printed \
                       as JSON on stdout, logs go to stderr.")]
#[command(version)]
pub struct Cli {
    /// Configuration file layered under the environment
    #[arg(long, global = true, help = "Path to a TOML config file (default: ./irp.toml)")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, help = "Log level or filter, e.g. debug or irp_client=trace")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, help = "Write structured JSON logs to stderr")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and wait on Risk Modeler workflows
    #[command(subcommand)]
    Workflow(WorkflowCommands),
    /// Wait on platform jobs (geohaz, model, export, grouping, riskdata)
    #[command(subcommand)]
    Job(JobCommands),
    /// Exposure data managers
    #[command(subcommand)]
    Edm(EdmCommands),
    /// Portfolios inside an EDM
    #[command(subcommand)]
    Portfolio(PortfolioCommands),
    /// Reference-table tags
    #[command(subcommand)]
    Tag(TagCommands),
    /// Results Data Mart exports
    #[command(subcommand)]
    Rdm(RdmCommands),
}

/// Overrides for the configured polling interval and timeout
#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Seconds between status checks
    #[arg(long, help = "Seconds between status checks (default from config)")]
    pub interval: Option<u64>,
    /// Give up after this many seconds
    #[arg(long, help = "Seconds before giving up (default from config)")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// Fetch one workflow's current state
    Get {
        /// Workflow id
        id: u64,
    },
    /// Poll one workflow until it finishes
    Wait {
        /// Workflow id
        id: u64,
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Poll several workflows until all of them finish
    WaitBatch {
        /// Workflow ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u64>,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Subcommand)]
pub enum JobCommands {
    /// Poll one or more platform jobs until they finish
    Wait {
        /// Service that owns the jobs
        #[arg(long, value_enum)]
        kind: JobKind,
        /// Job ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u64>,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Subcommand)]
pub enum EdmCommands {
    /// List EDMs, optionally filtered
    List {
        /// Server-side filter expression, e.g. exposureName="MY_EDM"
        #[arg(long, default_value = "")]
        filter: String,
    },
}

#[derive(Subcommand)]
pub enum PortfolioCommands {
    /// List the portfolios of an EDM
    List {
        /// EDM name
        #[arg(long)]
        edm: String,
        /// Server-side filter expression
        #[arg(long, default_value = "")]
        filter: String,
    },
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// Print the id of a tag, optionally creating it
    Id {
        /// Tag name
        name: String,
        /// Create the tag when it does not exist
        #[arg(long)]
        create: bool,
    },
}

#[derive(Subcommand)]
pub enum RdmCommands {
    /// Export analyses of one EDM into an RDM
    Export {
        /// EDM holding the analyses
        #[arg(long)]
        edm: String,
        /// Target RDM name
        #[arg(long)]
        rdm: String,
        /// Analysis names to export
        #[arg(long = "analysis", required = true, num_args = 1..)]
        analyses: Vec<String>,
        /// Poll the export job until it finishes
        #[arg(long)]
        wait: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
}
