use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::http::RetryConfig;
use crate::riskmodeler::PollOptions;

pub const DEFAULT_BASE_URL: &str = "https://api-euw1.rms-ppe.com";
/// Shipped in sample .env files; never a real key.
pub const PLACEHOLDER_API_KEY: &str = "your_api_key";

const CONFIG_FILE: &str = "irp.toml";

/// Main configuration structure for the IRP client
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IrpConfig {
    /// Risk Modeler API connection
    pub api: ApiConfig,
    /// Retry/backoff for throttled and transient failures
    pub retry: RetryConfig,
    /// Workflow polling defaults
    pub polling: PollingConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header
    pub api_key: Option<String>,
    /// Sent as `x-rms-resource-group-id` when set
    pub resource_group_id: Option<String>,
    pub request_timeout_secs: u64,
    /// Client-side rate limit; unlimited when unset
    pub requests_per_second: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            resource_group_id: None,
            request_timeout_secs: 200,
            requests_per_second: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub batch_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            batch_interval_secs: 20,
            timeout_secs: 600,
        }
    }
}

impl PollingConfig {
    pub fn single(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn batch(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.batch_interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level; RUST_LOG takes precedence
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl IrpConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. irp.toml in the working directory
    /// 3. Environment variables (IRP__SECTION__KEY)
    /// 4. RISK_MODELER_BASE_URL / _API_KEY / _RESOURCE_GROUP_ID
    pub fn load() -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with(Some(Path::new(CONFIG_FILE)), env)
    }

    /// Same as [`IrpConfig::load`] with an explicit file and environment.
    pub fn load_with(file: Option<&Path>, env: HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&IrpConfig::default())?);

        if let Some(path) = file {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("IRP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        let mut irp_config: IrpConfig = builder.build()?.try_deserialize()?;
        irp_config.apply_risk_modeler_env(|key| env.get(key).cloned());
        Ok(irp_config)
    }

    /// The variable names used by existing Risk Modeler tooling win over
    /// everything else.
    fn apply_risk_modeler_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = non_empty("RISK_MODELER_BASE_URL") {
            self.api.base_url = base_url;
        }
        if let Some(api_key) = non_empty("RISK_MODELER_API_KEY") {
            self.api.api_key = Some(api_key);
        }
        if let Some(group) = non_empty("RISK_MODELER_RESOURCE_GROUP_ID") {
            self.api.resource_group_id = Some(group);
        }
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<IrpConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = IrpConfig::load_env_file();
        IrpConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static IrpConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
