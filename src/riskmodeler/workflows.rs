// Workflow status model and the polling loops built on it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, Instrument};

use super::client::Client;
use super::endpoints;
use super::errors::{IrpError, PollKind};
use super::types::de_id;
use super::validators;
use crate::observability::api_metrics;
use crate::telemetry::{generate_correlation_id, poll_span};

/// Page size used when listing workflows by id.
pub const BATCH_PAGE_SIZE: usize = 100;

/// Status of a Risk Modeler workflow or platform job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkflowStatus {
    Queued,
    Pending,
    Running,
    CancelRequested,
    Cancelling,
    Finished,
    Failed,
    Cancelled,
    Unknown(String),
}

impl From<&str> for WorkflowStatus {
    fn from(status: &str) -> Self {
        match status {
            "QUEUED" => WorkflowStatus::Queued,
            "PENDING" => WorkflowStatus::Pending,
            "RUNNING" => WorkflowStatus::Running,
            "CANCEL_REQUESTED" => WorkflowStatus::CancelRequested,
            "CANCELLING" => WorkflowStatus::Cancelling,
            "FINISHED" => WorkflowStatus::Finished,
            "FAILED" => WorkflowStatus::Failed,
            "CANCELLED" => WorkflowStatus::Cancelled,
            _ => WorkflowStatus::Unknown(status.to_string()),
        }
    }
}

impl From<String> for WorkflowStatus {
    fn from(status: String) -> Self {
        WorkflowStatus::from(status.as_str())
    }
}

impl From<WorkflowStatus> for String {
    fn from(status: WorkflowStatus) -> Self {
        status.as_str().to_string()
    }
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkflowStatus::Queued => "QUEUED",
            WorkflowStatus::Pending => "PENDING",
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::CancelRequested => "CANCEL_REQUESTED",
            WorkflowStatus::Cancelling => "CANCELLING",
            WorkflowStatus::Finished => "FINISHED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::Cancelled => "CANCELLED",
            WorkflowStatus::Unknown(raw) => raw,
        }
    }

    /// FINISHED, FAILED or CANCELLED. Unrecognised statuses are treated as
    /// still running.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Finished | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Queued
                | WorkflowStatus::Pending
                | WorkflowStatus::Running
                | WorkflowStatus::CancelRequested
                | WorkflowStatus::Cancelling
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, WorkflowStatus::Failed | WorkflowStatus::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow or job status document. Only the fields the client reads are
/// typed; everything else is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default, deserialize_with = "de_id")]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Workflow {
    /// Progress as reported by the server, or "-" when absent.
    pub fn progress_label(&self) -> String {
        match &self.progress {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }

    /// Wall time between submission and completion, when both timestamps
    /// are present and parse as RFC 3339.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let parse = |raw: &Option<String>| -> Option<DateTime<FixedOffset>> {
            raw.as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        };
        let submitted = parse(&self.submit_time).or_else(|| parse(&self.start_time))?;
        let ended = parse(&self.end_time)?;
        Some(ended - submitted)
    }

    fn failure_error(self) -> IrpError {
        IrpError::WorkflowFailed {
            id: self.id,
            status: self.status.clone(),
            workflow: Box::new(self),
        }
    }
}

/// All workflows matching a batch query, aggregated across pages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowBatch {
    pub total_match_count: u64,
    pub workflows: Vec<Workflow>,
}

impl WorkflowBatch {
    pub fn all_terminal(&self) -> bool {
        self.workflows.iter().all(|w| w.status.is_terminal())
    }

    pub fn failures(&self) -> Vec<FailedWorkflow> {
        self.workflows
            .iter()
            .filter(|w| w.status.is_failure())
            .map(FailedWorkflow::from)
            .collect()
    }

    fn in_progress_count(&self) -> usize {
        self.workflows
            .iter()
            .filter(|w| !w.status.is_terminal())
            .count()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowPage {
    total_match_count: Option<u64>,
    #[serde(default)]
    workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedWorkflow {
    pub id: u64,
    pub status: WorkflowStatus,
    pub name: Option<String>,
}

impl From<&Workflow> for FailedWorkflow {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id,
            status: workflow.status.clone(),
            name: workflow.name.clone(),
        }
    }
}

/// Sleep interval and overall deadline for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
    pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(20);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    pub fn single() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn batch() -> Self {
        Self {
            interval: Self::DEFAULT_BATCH_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), IrpError> {
        validators::non_zero_duration(self.interval, "interval")?;
        validators::non_zero_duration(self.timeout, "timeout")
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::single()
    }
}

struct Deadline {
    at: Instant,
}

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    fn remaining(&self) -> Option<Duration> {
        let left = self.at.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }
}

/// Drive `fetch` until it reports a terminal status. FAILED and CANCELLED
/// become `IrpError::WorkflowFailed`; running past the deadline becomes
/// `IrpError::PollTimeout`.
pub(crate) async fn poll_until_terminal<F, Fut>(
    target: &str,
    kind: PollKind,
    options: &PollOptions,
    mut fetch: F,
) -> Result<Workflow, IrpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Workflow, IrpError>>,
{
    options.validate()?;
    let correlation_id = generate_correlation_id();
    let span = poll_span(target, &correlation_id);

    async move {
        let deadline = Deadline::after(options.timeout);
        loop {
            api_metrics().record_poll();
            let workflow = fetch().await?;
            info!(
                status = %workflow.status,
                progress = %workflow.progress_label(),
                "Polled {target}"
            );

            if workflow.status.is_terminal() {
                if workflow.status.is_failure() {
                    error!(id = workflow.id, status = %workflow.status, "{target} did not finish");
                    return Err(workflow.failure_error());
                }
                return Ok::<_, IrpError>(workflow);
            }

            match deadline.remaining() {
                Some(left) => tokio::time::sleep(options.interval.min(left)).await,
                None => {
                    return Err(IrpError::PollTimeout {
                        target: target.to_string(),
                        kind,
                        timeout: options.timeout,
                        last_status: workflow.status.to_string(),
                    })
                }
            }
        }
    }
    .instrument(span)
    .await
}

pub(crate) fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl Client {
    /// GET `/riskmodeler/v1/workflows/{id}`.
    pub async fn get_workflow(&self, workflow_id: u64) -> Result<Workflow, IrpError> {
        validators::positive(workflow_id, "workflow_id")?;
        self.get_json(&endpoints::workflow(workflow_id), &[])
            .await
            .map_err(|e| e.context(format!("Failed to get workflow {workflow_id}")))
    }

    /// GET a workflow by the absolute URL returned in a `Location` header.
    pub async fn fetch_workflow(&self, workflow_url: &str) -> Result<Workflow, IrpError> {
        let response = self
            .send(&self.request_url(Method::GET, workflow_url))
            .await?;
        response.json()
    }

    /// Poll a workflow URL until FINISHED, FAILED or CANCELLED.
    pub async fn poll_workflow(
        &self,
        workflow_url: &str,
        options: &PollOptions,
    ) -> Result<Workflow, IrpError> {
        validators::non_empty(workflow_url, "workflow_url")?;
        poll_until_terminal(&format!("workflow {workflow_url}"), PollKind::Workflow, options, || {
            self.fetch_workflow(workflow_url)
        })
        .await
    }

    pub async fn poll_workflow_to_completion(
        &self,
        workflow_id: u64,
        options: &PollOptions,
    ) -> Result<Workflow, IrpError> {
        validators::positive(workflow_id, "workflow_id")?;
        poll_until_terminal(&format!("workflow {workflow_id}"), PollKind::Workflow, options, || {
            self.get_workflow(workflow_id)
        })
        .await
    }

    /// One full paginated pass over the given workflow ids.
    pub async fn fetch_workflow_batch(&self, workflow_ids: &[u64]) -> Result<WorkflowBatch, IrpError> {
        validators::non_empty_list(workflow_ids, "workflow_ids")?;
        let ids = join_ids(workflow_ids);
        let mut workflows: Vec<Workflow> = Vec::with_capacity(workflow_ids.len());
        let mut offset = 0usize;

        loop {
            let spec = self
                .request(Method::GET, endpoints::WORKFLOWS)
                .query("ids", &ids)
                .query("limit", BATCH_PAGE_SIZE)
                .query("offset", offset);
            let page: WorkflowPage = self.send(&spec).await?.json()?;

            let total = page.total_match_count.ok_or_else(|| {
                IrpError::malformed("workflow batch response", "missing 'totalMatchCount'")
            })?;
            let received = page.workflows.len();
            workflows.extend(page.workflows);
            debug!(offset, received, total, "Fetched workflow page");

            if workflows.len() as u64 >= total {
                return Ok(WorkflowBatch {
                    total_match_count: total,
                    workflows,
                });
            }
            if received == 0 {
                return Err(IrpError::malformed(
                    "workflow batch response",
                    format!(
                        "empty page at offset {offset} after {} of {total} workflows",
                        workflows.len()
                    ),
                ));
            }
            offset += BATCH_PAGE_SIZE;
        }
    }

    /// Repeat paginated passes until every workflow in the batch is terminal.
    /// Failed workflows are returned, not raised.
    pub async fn poll_workflow_batch(
        &self,
        workflow_ids: &[u64],
        options: &PollOptions,
    ) -> Result<WorkflowBatch, IrpError> {
        validators::non_empty_list(workflow_ids, "workflow_ids")?;
        options.validate()?;

        let target = format!("batch of {} workflows", workflow_ids.len());
        let correlation_id = generate_correlation_id();
        let span = poll_span(&target, &correlation_id);

        async move {
            let deadline = Deadline::after(options.timeout);
            loop {
                api_metrics().record_poll();
                let batch = self.fetch_workflow_batch(workflow_ids).await?;
                let pending = batch.in_progress_count();
                info!(
                    ids = %join_ids(workflow_ids),
                    total = batch.workflows.len(),
                    pending,
                    "Polled workflow batch"
                );

                if pending == 0 {
                    return Ok::<_, IrpError>(batch);
                }

                match deadline.remaining() {
                    Some(left) => tokio::time::sleep(options.interval.min(left)).await,
                    None => {
                        return Err(IrpError::PollTimeout {
                            target,
                            kind: PollKind::WorkflowBatch,
                            timeout: options.timeout,
                            last_status: format!(
                                "{pending} of {} still in progress",
                                batch.workflows.len()
                            ),
                        })
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Like `poll_workflow_batch`, but any FAILED or CANCELLED workflow makes
    /// the whole batch an error.
    pub async fn poll_workflow_batch_to_completion(
        &self,
        workflow_ids: &[u64],
        options: &PollOptions,
    ) -> Result<WorkflowBatch, IrpError> {
        let batch = self.poll_workflow_batch(workflow_ids, options).await?;
        let failed = batch.failures();
        if !failed.is_empty() {
            error!(failed = failed.len(), "Workflow batch finished with failures");
            return Err(IrpError::WorkflowBatchFailed {
                total: batch.workflows.len(),
                failed,
            });
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_vocabulary() {
        for raw in ["QUEUED", "PENDING", "RUNNING", "CANCEL_REQUESTED", "CANCELLING"] {
            let status = WorkflowStatus::from(raw);
            assert!(status.is_in_progress(), "{raw}");
            assert!(!status.is_terminal(), "{raw}");
            assert_eq!(status.as_str(), raw);
        }
        assert!(WorkflowStatus::Finished.is_terminal());
        assert!(!WorkflowStatus::Finished.is_failure());
        assert!(WorkflowStatus::Failed.is_failure());
        assert!(WorkflowStatus::Cancelled.is_failure());
    }

    #[test]
    fn unknown_status_is_neither_terminal_nor_in_progress() {
        let status = WorkflowStatus::from("PAUSED");
        assert_eq!(status, WorkflowStatus::Unknown("PAUSED".to_string()));
        assert!(!status.is_terminal());
        assert!(!status.is_in_progress());
        assert_eq!(status.to_string(), "PAUSED");
    }

    #[test]
    fn workflow_document_parses_with_extras() {
        let workflow: Workflow = serde_json::from_value(json!({
            "id": 5150,
            "type": "IMPORT",
            "name": "MRI import",
            "status": "FINISHED",
            "progress": 100,
            "submitTime": "2024-05-01T10:00:00Z",
            "endTime": "2024-05-01T10:02:30Z",
            "output": {"analysisId": 88},
            "userName": "svc"
        }))
        .unwrap();

        assert_eq!(workflow.id, 5150);
        assert_eq!(workflow.kind.as_deref(), Some("IMPORT"));
        assert_eq!(workflow.progress_label(), "100");
        assert_eq!(workflow.elapsed(), Some(chrono::Duration::seconds(150)));
        assert_eq!(workflow.extra["userName"], "svc");

        let back = serde_json::to_value(&workflow).unwrap();
        assert_eq!(back["status"], "FINISHED");
        assert_eq!(back["type"], "IMPORT");
    }

    #[test]
    fn workflow_without_status_is_rejected() {
        let parsed: Result<Workflow, _> = serde_json::from_value(json!({"id": 1, "progress": 10}));
        assert!(parsed.is_err());
    }

    #[test]
    fn poll_options_reject_zero_durations() {
        assert!(PollOptions::single().validate().is_ok());
        assert!(PollOptions::single()
            .with_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PollOptions::batch()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn batch_reports_failures() {
        let batch = WorkflowBatch {
            total_match_count: 3,
            workflows: vec![
                serde_json::from_value(json!({"id": 1, "status": "FINISHED"})).unwrap(),
                serde_json::from_value(json!({"id": 2, "status": "FAILED", "name": "geohaz"})).unwrap(),
                serde_json::from_value(json!({"id": 3, "status": "CANCELLED"})).unwrap(),
            ],
        };
        assert!(batch.all_terminal());
        let failed = batch.failures();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].name.as_deref(), Some("geohaz"));
        assert_eq!(failed[1].status, WorkflowStatus::Cancelled);
    }

    #[tokio::test]
    async fn poll_loop_stops_on_finished() {
        let mut statuses = vec!["FINISHED", "RUNNING", "QUEUED"];
        let options = PollOptions::single().with_interval(Duration::from_millis(1));
        let workflow = poll_until_terminal("test", PollKind::Workflow, &options, || {
            let status = statuses.pop().unwrap();
            async move { Ok(serde_json::from_value::<Workflow>(json!({"id": 9, "status": status})).unwrap()) }
        })
        .await
        .unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Finished);
        assert!(statuses.is_empty());
    }

    #[tokio::test]
    async fn poll_loop_times_out_with_last_status() {
        let options = PollOptions::single()
            .with_interval(Duration::from_millis(5))
            .with_timeout(Duration::from_millis(20));
        let err = poll_until_terminal("workflow 9", PollKind::Workflow, &options, || async {
            Ok(serde_json::from_value::<Workflow>(json!({"id": 9, "status": "RUNNING"})).unwrap())
        })
        .await
        .unwrap_err();

        match err {
            IrpError::PollTimeout { last_status, target, .. } => {
                assert_eq!(last_status, "RUNNING");
                assert_eq!(target, "workflow 9");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_loop_surfaces_cancelled() {
        let options = PollOptions::single().with_interval(Duration::from_millis(1));
        let err = poll_until_terminal("workflow 4", PollKind::Workflow, &options, || async {
            Ok(serde_json::from_value::<Workflow>(json!({"id": 4, "status": "CANCELLED"})).unwrap())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            IrpError::WorkflowFailed { id: 4, status: WorkflowStatus::Cancelled, .. }
        ));
    }
}
