use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;

use irp_client::cli::{commands, Cli};
use irp_client::config::{self, IrpConfig};
use irp_client::observability::api_metrics;
use irp_client::riskmodeler::IrpError;
use irp_client::telemetry::init_telemetry;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            if let Some(hint) = e.downcast_ref::<IrpError>().and_then(IrpError::hint) {
                eprintln!("💡 {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            IrpConfig::load_env_file()?;
            IrpConfig::load_with(Some(path), std::env::vars().collect())?
        }
        None => config::config()?.clone(),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    init_telemetry(&level, cli.json_logs || config.observability.json_logs)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        let result = commands::dispatch(cli.command, config).await;
        api_metrics().log_stats();
        result
    })
}
