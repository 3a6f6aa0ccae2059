use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};
use crate::store::JobStore;
use crate::types::JobRecord;

/// In-process [`JobStore`]; state is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<BTreeMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> Result<MutexGuard<'_, BTreeMap<String, JobRecord>>> {
        self.jobs
            .lock()
            .map_err(|_| SchedulerError::Store("job map lock poisoned".into()))
    }
}

impl JobStore for MemoryJobStore {
    fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        Ok(self.jobs()?.get(job_id).cloned())
    }

    fn find_by_company(&self, company_id: &str) -> Result<Vec<JobRecord>> {
        Ok(self
            .jobs()?
            .values()
            .filter(|j| j.company_id == company_id)
            .cloned()
            .collect())
    }

    fn list(&self) -> Result<Vec<JobRecord>> {
        Ok(self.jobs()?.values().cloned().collect())
    }

    fn upsert(&self, job: &JobRecord) -> Result<JobRecord> {
        job.validate()?;
        let mut jobs = self.jobs()?;
        let stored = match jobs.get(&job.job_id) {
            Some(existing) => JobRecord {
                last_run: existing.last_run,
                created_at: existing.created_at,
                ..job.clone()
            },
            None => job.clone(),
        };
        jobs.insert(stored.job_id.clone(), stored.clone());
        Ok(stored)
    }

    fn delete(&self, job_id: &str) -> Result<bool> {
        Ok(self.jobs()?.remove(job_id).is_some())
    }

    fn delete_by_company(&self, company_id: &str) -> Result<usize> {
        let mut jobs = self.jobs()?;
        let before = jobs.len();
        jobs.retain(|_, j| j.company_id != company_id);
        Ok(before - jobs.len())
    }

    fn mark_run(&self, job_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut jobs = self.jobs()?;
        let job = jobs.get_mut(job_id).ok_or_else(|| SchedulerError::JobNotFound {
            id: job_id.to_string(),
        })?;
        job.last_run = Some(at);
        Ok(())
    }
}
