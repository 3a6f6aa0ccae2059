use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::schedule::is_due;
use crate::types::JobRecord;

/// Persistence for [`JobRecord`]s, keyed by job id.
///
/// Every listing is ordered by `job_id`, which keeps [`JobStore::list_due`]
/// deterministic for a given store state and `now`.
pub trait JobStore: Send + Sync {
    fn get(&self, job_id: &str) -> Result<Option<JobRecord>>;

    fn find_by_company(&self, company_id: &str) -> Result<Vec<JobRecord>>;

    fn list(&self) -> Result<Vec<JobRecord>>;

    /// Validate and write `job`, returning the stored record.
    ///
    /// Updating an existing job keeps its `last_run` and `created_at`, so
    /// editing a job never makes it run twice on the same day.
    fn upsert(&self, job: &JobRecord) -> Result<JobRecord>;

    /// Remove a job. Returns `false` if it did not exist.
    fn delete(&self, job_id: &str) -> Result<bool>;

    /// Remove every job for a company. Returns how many were removed.
    fn delete_by_company(&self, company_id: &str) -> Result<usize>;

    /// Record a successful run. Setting the same timestamp twice is a no-op.
    fn mark_run(&self, job_id: &str, at: DateTime<Utc>) -> Result<()>;

    fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|job| is_due(job, now))
            .collect())
    }
}
