use thiserror::Error;

/// Errors from the accounting report API.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("report API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid report response: {0}")]
    Parse(String),
}

/// Errors from the email delivery collaborator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mail API rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("mail API unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail delivery not configured: {0}")]
    NotConfigured(String),

    #[error("no valid recipients")]
    NoRecipients,
}
