// Platform jobs (geohaz, model, export, grouping, riskdata) share the workflow
// status vocabulary but live under their own service paths.

use std::fmt;

use tokio::time::Instant;
use tracing::{info, Instrument};

use super::client::Client;
use super::endpoints;
use super::errors::{IrpError, PollKind};
use super::validators;
use super::workflows::{join_ids, poll_until_terminal, FailedWorkflow, PollOptions, Workflow};
use crate::observability::api_metrics;
use crate::telemetry::{generate_correlation_id, poll_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum JobKind {
    Geohaz,
    Model,
    Export,
    Grouping,
    RiskData,
}

impl JobKind {
    /// Path segment of the owning platform service.
    pub fn service(&self) -> &'static str {
        match self {
            JobKind::Geohaz => "geohaz",
            JobKind::Model => "model",
            JobKind::Export => "export",
            JobKind::Grouping => "grouping",
            JobKind::RiskData => "riskdata",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}

impl Client {
    pub async fn get_job(&self, kind: JobKind, job_id: u64) -> Result<Workflow, IrpError> {
        validators::positive(job_id, "job_id")?;
        self.get_json(&endpoints::job(kind.service(), job_id), &[])
            .await
            .map_err(|e| e.context(format!("Failed to get {kind} job {job_id}")))
    }

    pub async fn poll_job_to_completion(
        &self,
        kind: JobKind,
        job_id: u64,
        options: &PollOptions,
    ) -> Result<Workflow, IrpError> {
        validators::positive(job_id, "job_id")?;
        poll_until_terminal(&format!("{kind} job {job_id}"), PollKind::Job, options, || {
            self.get_job(kind, job_id)
        })
        .await
    }

    /// Fetch every job in turn; a pass that meets a job still in progress
    /// sleeps and starts over. Any FAILED or CANCELLED job fails the batch.
    pub async fn poll_job_batch_to_completion(
        &self,
        kind: JobKind,
        job_ids: &[u64],
        options: &PollOptions,
    ) -> Result<Vec<Workflow>, IrpError> {
        validators::non_empty_list(job_ids, "job_ids")?;
        options.validate()?;

        let target = format!("batch of {} {kind} jobs", job_ids.len());
        let correlation_id = generate_correlation_id();
        let span = poll_span(&target, &correlation_id);

        let jobs = async {
            let deadline = Instant::now() + options.timeout;
            'pass: loop {
                api_metrics().record_poll();
                info!(ids = %join_ids(job_ids), "Polling {kind} job batch");

                let mut jobs = Vec::with_capacity(job_ids.len());
                for &job_id in job_ids {
                    let job = self.get_job(kind, job_id).await?;
                    if !job.status.is_terminal() {
                        let left = deadline.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            return Err(IrpError::PollTimeout {
                                target: target.clone(),
                                kind: PollKind::JobBatch,
                                timeout: options.timeout,
                                last_status: format!("job {job_id} {}", job.status),
                            });
                        }
                        tokio::time::sleep(options.interval.min(left)).await;
                        continue 'pass;
                    }
                    jobs.push(job);
                }
                return Ok::<_, IrpError>(jobs);
            }
        }
        .instrument(span)
        .await?;

        let failed: Vec<FailedWorkflow> = jobs
            .iter()
            .filter(|job| job.status.is_failure())
            .map(FailedWorkflow::from)
            .collect();
        if !failed.is_empty() {
            return Err(IrpError::WorkflowBatchFailed {
                total: jobs.len(),
                failed,
            });
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_map_to_platform_paths() {
        assert_eq!(endpoints::job(JobKind::Geohaz.service(), 12), "/platform/geohaz/v1/jobs/12");
        assert_eq!(endpoints::job(JobKind::RiskData.service(), 3), "/platform/riskdata/v1/jobs/3");
        assert_eq!(JobKind::Export.to_string(), "export");
    }
}
