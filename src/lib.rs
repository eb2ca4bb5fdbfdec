// irp-client: async Risk Modeler / Intelligent Risk Platform API client
// with workflow polling. The `irp` binary is a thin CLI over this library.

pub mod cli;
pub mod config;
pub mod http;
pub mod observability;
pub mod riskmodeler;
pub mod telemetry;

// Re-export key types for easy access
pub use crate::config::{config, IrpConfig};
pub use crate::http::{HttpSession, RetryConfig, RetryPolicy};
pub use observability::{api_metrics, ApiMetrics, OperationTimer};
pub use riskmodeler::{
    Client, IrpError, JobKind, PollOptions, Workflow, WorkflowBatch, WorkflowExecution,
    WorkflowStatus,
};
pub use telemetry::{generate_correlation_id, init_telemetry};
