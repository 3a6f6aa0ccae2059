use tally_credentials::CredentialError;
use tally_reports::{DeliveryError, ReportError};
use thiserror::Error;

use crate::types::FailureKind;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The job definition is malformed; nothing was written.
    #[error("Invalid job: {0}")]
    Validation(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// The store could not be accessed (e.g. a poisoned lock).
    #[error("Job store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why a single job run failed. Caught at the runner's per-job boundary.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Store(#[from] SchedulerError),
}

impl JobFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobFailure::Credentials(CredentialError::Unauthorized { .. }) => {
                FailureKind::Unauthorized
            }
            JobFailure::Credentials(
                CredentialError::RefreshFailed(_) | CredentialError::Exchange(_),
            ) => FailureKind::RefreshFailed,
            JobFailure::Credentials(CredentialError::Database(_) | CredentialError::Store(_)) => {
                FailureKind::StoreError
            }
            JobFailure::Report(_) => FailureKind::ApiError,
            JobFailure::Delivery(_) => FailureKind::DeliveryError,
            JobFailure::Store(_) => FailureKind::StoreError,
        }
    }
}
