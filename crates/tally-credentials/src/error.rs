use thiserror::Error;

/// Errors raised by the credential store and the OAuth exchange.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No usable credentials: the company never connected, was disconnected,
    /// or its refresh token expired. Only a new OAuth consent fixes this.
    #[error("company {company_id} is not authorized: {reason}")]
    Unauthorized { company_id: String, reason: String },

    /// The authorization server rejected the refresh token or could not be reached.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The authorization-code exchange failed during the consent callback.
    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store could not be accessed (e.g. a poisoned lock).
    #[error("token store error: {0}")]
    Store(String),
}

impl CredentialError {
    pub(crate) fn unauthorized(company_id: &str, reason: impl Into<String>) -> Self {
        CredentialError::Unauthorized {
            company_id: company_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CredentialError>;
