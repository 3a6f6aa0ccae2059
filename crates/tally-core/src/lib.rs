//! `tally-core`: configuration and error types shared by every Tally crate.

pub mod config;
pub mod error;

pub use config::TallyConfig;
pub use error::{CoreError, Result};
