use std::path::PathBuf;
use std::time::Duration;

use super::workflows::{FailedWorkflow, Workflow, WorkflowStatus};

/// What a poll loop was waiting on, so a timeout can say how to resume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    Workflow,
    WorkflowBatch,
    Job,
    JobBatch,
}

/// Every failure the Risk Modeler client can surface.
#[derive(Debug, thiserror::Error)]
pub enum IrpError {
    #[error("invalid {param}: {reason}")]
    Validation { param: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx response, enriched with whatever the server sent back.
    #[error("HTTP {status} from {method} {url}{}", render_detail(.detail))]
    Api {
        method: String,
        url: String,
        status: u16,
        detail: Option<String>,
    },

    #[error("request error for {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response from {context}: {reason}")]
    MalformedResponse { context: String, reason: String },

    #[error("Location header missing from {0}")]
    MissingLocation(String),

    #[error("could not extract an id from Location header '{0}'")]
    InvalidLocation(String),

    #[error("workflow {id} ended with status {status}")]
    WorkflowFailed {
        id: u64,
        status: WorkflowStatus,
        workflow: Box<Workflow>,
    },

    #[error("{} of {total} workflows did not finish: {}", .failed.len(), render_failed(.failed))]
    WorkflowBatchFailed {
        total: usize,
        failed: Vec<FailedWorkflow>,
    },

    #[error("{target} did not complete within {} seconds (last status: {last_status})", .timeout.as_secs())]
    PollTimeout {
        target: String,
        kind: PollKind,
        timeout: Duration,
        last_status: String,
    },

    #[error("expected exactly one {resource} named '{name}', found {found}")]
    Lookup {
        resource: &'static str,
        name: String,
        found: usize,
    },

    #[error("{found} {resource} found with name '{name}', please use a unique name")]
    Duplicate {
        resource: &'static str,
        name: String,
        found: usize,
    },

    #[error("{0}")]
    ReferenceData(String),

    #[error("{0}")]
    Precondition(String),

    #[error("failed to decode field '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("file error for {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<IrpError>,
    },
}

impl IrpError {
    pub fn validation(param: impl Into<String>, reason: impl Into<String>) -> Self {
        IrpError::Validation {
            param: param.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        IrpError::MalformedResponse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Wrap the error with a description of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        IrpError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Context` layers.
    pub fn root(&self) -> &IrpError {
        match self {
            IrpError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status of the failed response, if the failure was an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self.root() {
            IrpError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// One-line remediation hint for the command line.
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            IrpError::Config(_) => {
                Some("set RISK_MODELER_API_KEY (and optionally RISK_MODELER_BASE_URL) in the environment or in .env")
            }
            IrpError::Api { status: 401, .. } => {
                Some("the API key was rejected; check RISK_MODELER_API_KEY")
            }
            IrpError::Api { status: 403, .. } => {
                Some("the key has no access here; check RISK_MODELER_RESOURCE_GROUP_ID")
            }
            IrpError::Api { status: 404, .. } => {
                Some("resource not found; check the id and that RISK_MODELER_BASE_URL points at the right tenant")
            }
            IrpError::Api { status: 429, .. } => {
                Some("still rate limited after all retries; lower api.requests_per_second or try again later")
            }
            IrpError::Transport { .. } => {
                Some("could not reach the API; check RISK_MODELER_BASE_URL and network access")
            }
            IrpError::PollTimeout { kind, .. } => Some(match kind {
                PollKind::Workflow => {
                    "the workflow keeps running server-side; resume with `irp workflow wait <id>`"
                }
                PollKind::WorkflowBatch => {
                    "the workflows keep running server-side; resume with `irp workflow wait-batch <ids>`"
                }
                PollKind::Job | PollKind::JobBatch => {
                    "the jobs keep running server-side; resume with `irp job wait --kind <kind> <ids>`"
                }
            }),
            _ => None,
        }
    }
}

fn render_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(" | {detail}"),
        None => String::new(),
    }
}

fn render_failed(failed: &[FailedWorkflow]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.id, f.status))
        .collect::<Vec<_>>()
        .join(", ")
}
