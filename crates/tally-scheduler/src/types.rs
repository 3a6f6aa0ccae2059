use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

/// A persisted daily report job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// UUID v4 string, primary key.
    pub job_id: String,
    /// Company (QuickBooks realm) whose balance sheet is sent.
    pub company_id: String,
    /// One address, or several separated by commas.
    pub recipient_email: String,
    /// Time of day the report becomes due, in `timezone`.
    #[serde(with = "hhmm")]
    pub schedule_time: NaiveTime,
    pub timezone: Tz,
    /// Completion time of the most recent successful run.
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// A new, never-run job with a fresh id.
    pub fn new(
        company_id: impl Into<String>,
        recipient_email: impl Into<String>,
        schedule_time: NaiveTime,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            company_id: company_id.into(),
            recipient_email: recipient_email.into(),
            schedule_time,
            timezone,
            last_run: None,
            created_at: now,
        }
    }

    /// Check required fields. Called by every store before writing.
    pub fn validate(&self) -> Result<()> {
        if self.job_id.trim().is_empty() {
            return Err(SchedulerError::Validation("job_id is empty".into()));
        }
        if self.company_id.trim().is_empty() {
            return Err(SchedulerError::Validation("company_id is empty".into()));
        }
        if self.schedule_time.second() != 0 || self.schedule_time.nanosecond() != 0 {
            return Err(SchedulerError::Validation(
                "schedule_time must be a whole minute".into(),
            ));
        }
        validate_recipients(&self.recipient_email)
    }
}

fn validate_recipients(raw: &str) -> Result<()> {
    let addrs: Vec<&str> = raw.split(',').map(str::trim).collect();
    if addrs.iter().all(|a| a.is_empty()) {
        return Err(SchedulerError::Validation("recipient_email is empty".into()));
    }
    for addr in addrs {
        let valid = match addr.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !addr.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            return Err(SchedulerError::Validation(format!(
                "invalid recipient address: {addr:?}"
            )));
        }
    }
    Ok(())
}

/// `NaiveTime` as `"HH:MM"`.
pub(crate) mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        crate::schedule::parse_schedule_time(&raw).map_err(serde::de::Error::custom)
    }
}

/// Short, stable code for why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No credentials or the refresh token expired; needs a new OAuth consent.
    Unauthorized,
    RefreshFailed,
    ApiError,
    DeliveryError,
    StoreError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::RefreshFailed => "refresh_failed",
            FailureKind::ApiError => "api_error",
            FailureKind::DeliveryError => "delivery_error",
            FailureKind::StoreError => "store_error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
}

/// Result of running one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub company_id: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }
}

/// Everything one batch invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn outcome(&self, job_id: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.job_id == job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(recipient: &str) -> JobRecord {
        JobRecord::new(
            "realm-1",
            recipient,
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            chrono_tz::UTC,
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn accepts_single_and_multiple_recipients() {
        assert!(job("a@example.com").validate().is_ok());
        assert!(job("a@example.com, b@example.org").validate().is_ok());
    }

    #[test]
    fn rejects_malformed_recipients() {
        for bad in ["", "  ", "nobody", "@example.com", "a@", "a@b@c", "a b@c.com", "a@x.com,,"] {
            assert!(
                matches!(job(bad).validate(), Err(SchedulerError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_missing_company() {
        let mut j = job("a@example.com");
        j.company_id = " ".into();
        assert!(matches!(j.validate(), Err(SchedulerError::Validation(_))));
    }

    #[test]
    fn job_serializes_schedule_time_as_hh_mm() {
        let mut j = job("a@example.com");
        j.timezone = chrono_tz::America::New_York;
        let json = serde_json::to_value(&j).unwrap();
        assert_eq!(json["schedule_time"], "09:00");
        assert_eq!(json["timezone"], "America/New_York");
        let back: JobRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, j);
    }

    #[test]
    fn outcome_json_is_flat() {
        let outcome = JobOutcome {
            job_id: "j1".into(),
            company_id: "c1".into(),
            status: OutcomeStatus::Failed {
                kind: FailureKind::Unauthorized,
                reason: "refresh token expired".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "unauthorized");
        assert_eq!(json["job_id"], "j1");
    }
}
