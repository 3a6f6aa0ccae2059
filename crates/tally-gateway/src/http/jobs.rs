//! Report job configuration: create/update, list per company, delete, run now.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tally_credentials::CredentialError;
use tally_scheduler::schedule::{next_run_after, parse_schedule_time, parse_timezone};
use tally_scheduler::{JobOutcome, JobRecord, SchedulerError};
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct JobRequest {
    /// Present when editing an existing job.
    pub job_id: Option<String>,
    pub company_id: String,
    pub recipient_email: String,
    /// `HH:MM`, 24-hour.
    pub schedule_time: String,
    /// IANA zone name; UTC when omitted.
    pub timezone: Option<String>,
}

/// A job as returned to the client, with its next scheduled run.
#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: JobRecord,
    pub next_run: Option<DateTime<Utc>>,
}

impl JobView {
    fn new(job: JobRecord, now: DateTime<Utc>) -> Self {
        let next_run = next_run_after(&job, now);
        Self { job, next_run }
    }
}

/// POST /jobs
pub async fn save_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JobRequest>,
) -> ApiResult<Json<JobView>> {
    let now = Utc::now();
    let schedule_time = parse_schedule_time(&req.schedule_time)?;
    let timezone = match req.timezone.as_deref() {
        Some(tz) => parse_timezone(tz)?,
        None => chrono_tz::UTC,
    };

    if !state.credentials.is_connected(&req.company_id, now)? {
        return Err(CredentialError::Unauthorized {
            company_id: req.company_id,
            reason: "connect the company before scheduling reports".into(),
        }
        .into());
    }

    let mut job = JobRecord::new(
        req.company_id,
        req.recipient_email,
        schedule_time,
        timezone,
        now,
    );
    if let Some(job_id) = req.job_id {
        let existing = state
            .jobs
            .get(&job_id)?
            .ok_or(SchedulerError::JobNotFound { id: job_id })?;
        if existing.company_id != job.company_id {
            return Err(ApiError::BadRequest(format!(
                "job {} belongs to another company",
                existing.job_id
            )));
        }
        job.job_id = existing.job_id;
        job.created_at = existing.created_at;
        job.last_run = existing.last_run;
    }

    let saved = state.jobs.upsert(&job)?;
    info!(
        job_id = %saved.job_id,
        company_id = %saved.company_id,
        schedule_time = %saved.schedule_time.format("%H:%M"),
        timezone = %saved.timezone,
        "report job saved"
    );
    Ok(Json(JobView::new(saved, now)))
}

/// GET /companies/{company_id}/jobs
pub async fn list_company_jobs(
    State(state): State<Arc<AppState>>,
    Path(company_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let now = Utc::now();
    let connected = state.credentials.is_connected(&company_id, now)?;
    let jobs: Vec<JobView> = state
        .jobs
        .find_by_company(&company_id)?
        .into_iter()
        .map(|job| JobView::new(job, now))
        .collect();

    Ok(Json(json!({
        "company_id": company_id,
        "connected": connected,
        "jobs": jobs,
    })))
}

/// DELETE /jobs/{job_id}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.jobs.delete(&job_id)? {
        return Err(SchedulerError::JobNotFound { id: job_id }.into());
    }
    info!(%job_id, "report job deleted");
    Ok(Json(json!({ "job_id": job_id, "deleted": true })))
}

/// POST /jobs/{job_id}/run
///
/// Runs the job immediately. A failed run is still a 200; the outcome body
/// says what went wrong.
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobOutcome>> {
    let outcome = state.runner.run_job_now(&job_id, Utc::now()).await?;
    Ok(Json(outcome))
}
