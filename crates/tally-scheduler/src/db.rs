use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};
use crate::schedule::parse_schedule_time;
use crate::store::JobStore;
use crate::types::JobRecord;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` table (idempotent) and an index on `company_id` for the
/// setup flow's per-company listing and disconnect cleanup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            job_id          TEXT NOT NULL PRIMARY KEY,
            company_id      TEXT NOT NULL,
            recipient_email TEXT NOT NULL,
            schedule_time   TEXT NOT NULL,               -- HH:MM
            timezone        TEXT NOT NULL DEFAULT 'UTC', -- IANA name
            last_run        TEXT,                        -- RFC 3339 or NULL
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs (company_id);
        ",
    )
}

const JOB_SELECT_SQL: &str = "SELECT job_id, company_id, recipient_email, schedule_time,
        timezone, last_run, created_at
 FROM jobs";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

/// Map a SELECT row (column order from JOB_SELECT_SQL) to a JobRecord.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let schedule_time: String = row.get(3)?;
    let timezone: String = row.get(4)?;
    let last_run: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(JobRecord {
        job_id: row.get(0)?,
        company_id: row.get(1)?,
        recipient_email: row.get(2)?,
        schedule_time: parse_schedule_time(&schedule_time)
            .map_err(|e| conversion_error(3, e.to_string()))?,
        timezone: timezone
            .parse::<Tz>()
            .map_err(|_| conversion_error(4, format!("unknown timezone {timezone:?}")))?,
        last_run: last_run.as_deref().map(|s| parse_ts(5, s)).transpose()?,
        created_at: parse_ts(6, &created_at)?,
    })
}

/// SQLite-backed [`JobStore`].
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SchedulerError::Store("job connection lock poisoned".into()))
    }

    fn query(&self, filter: &str, params: impl rusqlite::Params) -> Result<Vec<JobRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{JOB_SELECT_SQL} {filter} ORDER BY job_id"))?;
        let jobs = stmt
            .query_map(params, row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

impl JobStore for SqliteJobStore {
    fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("{JOB_SELECT_SQL} WHERE job_id = ?1"),
                [job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn find_by_company(&self, company_id: &str) -> Result<Vec<JobRecord>> {
        self.query("WHERE company_id = ?1", [company_id])
    }

    fn list(&self) -> Result<Vec<JobRecord>> {
        self.query("", [])
    }

    fn upsert(&self, job: &JobRecord) -> Result<JobRecord> {
        job.validate()?;
        {
            let conn = self.conn()?;
            let now = Utc::now().to_rfc3339();
            // last_run and created_at are only written on first insert.
            conn.execute(
                "INSERT INTO jobs
                 (job_id, company_id, recipient_email, schedule_time, timezone,
                  last_run, created_at, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                 ON CONFLICT(job_id) DO UPDATE SET
                    company_id = excluded.company_id,
                    recipient_email = excluded.recipient_email,
                    schedule_time = excluded.schedule_time,
                    timezone = excluded.timezone,
                    updated_at = excluded.updated_at",
                params![
                    job.job_id,
                    job.company_id,
                    job.recipient_email,
                    job.schedule_time.format("%H:%M").to_string(),
                    job.timezone.name(),
                    job.last_run.map(|t| t.to_rfc3339()),
                    job.created_at.to_rfc3339(),
                    now,
                ],
            )?;
        }
        info!(job_id = %job.job_id, company_id = %job.company_id, "job saved");
        self.get(&job.job_id)?.ok_or_else(|| SchedulerError::JobNotFound {
            id: job.job_id.clone(),
        })
    }

    fn delete(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM jobs WHERE job_id = ?1", [job_id])?;
        if n > 0 {
            info!(job_id, "job removed");
        }
        Ok(n > 0)
    }

    fn delete_by_company(&self, company_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM jobs WHERE company_id = ?1", [company_id])?;
        debug!(company_id, count = n, "jobs removed for company");
        Ok(n)
    }

    fn mark_run(&self, job_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let ts = at.to_rfc3339();
        let n = conn.execute(
            "UPDATE jobs SET last_run = ?1, updated_at = ?1 WHERE job_id = ?2",
            params![ts, job_id],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound {
                id: job_id.to_string(),
            });
        }
        debug!(job_id, last_run = %ts, "job marked run");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn corrupt_row_surfaces_as_database_error() {
        let store = SqliteJobStore::new(Connection::open_in_memory().unwrap()).unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO jobs VALUES ('j', 'c', 'a@b.c', '9am', 'UTC', NULL, 'x', 'x')",
                [],
            )
            .unwrap();
        assert!(matches!(store.get("j"), Err(SchedulerError::Database(_))));
    }
}
