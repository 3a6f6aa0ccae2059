use std::sync::Arc;

use chrono::{DateTime, Utc};
use tally_credentials::CredentialManager;
use tally_reports::{format_report, ReportEmail, ReportMailer, ReportSource};
use tracing::{info, warn};

use crate::error::{JobFailure, Result, SchedulerError};
use crate::store::JobStore;
use crate::types::{JobOutcome, JobRecord, OutcomeStatus, RunReport};

pub const DEFAULT_SUBJECT_PREFIX: &str = "QuickBooks Balance Sheet Report";

/// Executes report jobs: token → fetch → format → deliver → mark run.
///
/// Holds no state of its own between invocations. Jobs run one after another;
/// a failing job is recorded in the [`RunReport`] and the batch moves on.
pub struct Runner {
    jobs: Arc<dyn JobStore>,
    credentials: Arc<CredentialManager>,
    reports: Arc<dyn ReportSource>,
    mailer: Arc<dyn ReportMailer>,
    subject_prefix: String,
}

impl Runner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        credentials: Arc<CredentialManager>,
        reports: Arc<dyn ReportSource>,
        mailer: Arc<dyn ReportMailer>,
    ) -> Self {
        Self {
            jobs,
            credentials,
            reports,
            mailer,
            subject_prefix: DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// Run every job that is due at `now`.
    ///
    /// Only fails when the due list itself cannot be loaded; individual job
    /// failures are reported in the returned [`RunReport`].
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let due = self.jobs.list_due(now)?;
        info!(count = due.len(), "due jobs loaded");

        let mut outcomes = Vec::with_capacity(due.len());
        for job in &due {
            outcomes.push(self.run_one(job, now).await);
        }

        let report = RunReport {
            started_at: now,
            outcomes,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }

    /// Run one job immediately, whether or not it is due.
    pub async fn run_job_now(&self, job_id: &str, now: DateTime<Utc>) -> Result<JobOutcome> {
        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| SchedulerError::JobNotFound {
                id: job_id.to_string(),
            })?;
        Ok(self.run_one(&job, now).await)
    }

    async fn run_one(&self, job: &JobRecord, now: DateTime<Utc>) -> JobOutcome {
        let status = match self.execute(job, now).await {
            Ok(()) => {
                info!(job_id = %job.job_id, company_id = %job.company_id, "report delivered");
                OutcomeStatus::Succeeded
            }
            Err(e) => {
                let kind = e.kind();
                warn!(
                    job_id = %job.job_id,
                    company_id = %job.company_id,
                    %kind,
                    error = %e,
                    "job failed"
                );
                OutcomeStatus::Failed {
                    kind,
                    reason: e.to_string(),
                }
            }
        };
        JobOutcome {
            job_id: job.job_id.clone(),
            company_id: job.company_id.clone(),
            status,
        }
    }

    async fn execute(
        &self,
        job: &JobRecord,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), JobFailure> {
        let token = self
            .credentials
            .get_valid_access_token(&job.company_id, now)
            .await?;

        let as_of = now.with_timezone(&job.timezone).date_naive();
        let raw = self.reports.fetch(&token, &job.company_id, as_of).await?;
        let payload = format_report(&raw);

        let email = ReportEmail::compose(
            &job.recipient_email,
            &self.subject_prefix,
            &job.company_id,
            &payload,
        )?;
        self.mailer.send(&email).await?;

        // The email is already out; a failure here means the job runs again
        // next invocation and the recipient gets a second copy.
        self.jobs.mark_run(&job.job_id, now)?;
        Ok(())
    }
}
