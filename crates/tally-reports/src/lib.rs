//! `tally-reports`: balance-sheet retrieval, formatting and delivery.
//!
//! [`client::QboClient`] fetches the raw report, [`format::format_report`]
//! turns it into a [`format::ReportPayload`] without any I/O, and a
//! [`delivery::ReportMailer`] hands the rendered payload to the recipients.

pub mod client;
pub mod delivery;
pub mod error;
pub mod format;
pub mod types;

pub use client::{QboClient, ReportSource};
pub use delivery::{LogMailer, ReportEmail, ReportMailer, ResendMailer};
pub use error::{DeliveryError, ReportError};
pub use format::{format_amount, format_report, LineKind, ReportLine, ReportPayload};
pub use types::RawReport;
