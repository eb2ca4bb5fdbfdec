// Risk Modeler / Intelligent Risk Platform API paths, relative to the base URL.

pub const WORKFLOWS: &str = "/riskmodeler/v1/workflows";

pub fn workflow(workflow_id: u64) -> String {
    format!("{WORKFLOWS}/{workflow_id}")
}

// Exposure data (EDMs, portfolios, treaties, analyses)
pub const EXPOSURES: &str = "/platform/riskdata/v1/exposures";
pub const ANALYSES: &str = "/platform/riskdata/v1/analyses";

pub fn exposure(exposure_id: u64) -> String {
    format!("{EXPOSURES}/{exposure_id}")
}

pub fn portfolios(exposure_id: u64) -> String {
    format!("{EXPOSURES}/{exposure_id}/portfolios")
}

pub fn portfolio_accounts(exposure_id: u64, portfolio_id: u64) -> String {
    format!("{EXPOSURES}/{exposure_id}/portfolios/{portfolio_id}/accounts")
}

pub fn treaties(exposure_id: u64) -> String {
    format!("{EXPOSURES}/{exposure_id}/treaties")
}

pub fn treaty(exposure_id: u64, treaty_id: u64) -> String {
    format!("{EXPOSURES}/{exposure_id}/treaties/{treaty_id}")
}

pub fn analysis(analysis_id: u64) -> String {
    format!("{ANALYSES}/{analysis_id}")
}

/// Platform job collection for a service (`geohaz`, `model`, ...).
pub fn jobs(service: &str) -> String {
    format!("/platform/{service}/v1/jobs")
}

pub fn job(service: &str, job_id: u64) -> String {
    format!("/platform/{service}/v1/jobs/{job_id}")
}

// Reference data
pub const TAGS: &str = "/data-store/referencetables/tag";
pub const MODEL_PROFILES: &str = "/analysis-settings/modelprofiles";
pub const OUTPUT_PROFILES: &str = "/analysis-settings/outputprofiles";
pub const EVENT_RATE_SCHEMES: &str = "/data-store/referencetables/eventratescheme";
pub const CURRENCIES: &str = "/data-store/referencetables/currency";
pub const DATA_SERVERS: &str = "/riskmodeler/v1/dataservers";

// MRI import
pub const STORAGE: &str = "/riskmodeler/v1/storage";
pub const IMPORTS: &str = "/riskmodeler/v1/imports";

pub fn storage_mapping(bucket_id: u64) -> String {
    format!("{STORAGE}/{bucket_id}/mapping")
}

/// Appended to a bucket URL to request upload credentials for one file.
pub const STORAGE_FILE_PATH: &str = "path";
