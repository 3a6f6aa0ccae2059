//! `tally-scheduler`: daily report jobs and the batch runner.
//!
//! # Overview
//!
//! Jobs are persisted through a [`store::JobStore`] (SQLite in production,
//! in-memory in tests). There is no long-running timer: an external trigger
//! (cron, or the setup server's "run now") calls [`runner::Runner::run_due`],
//! which picks every job that is due at that instant and runs it once.
//!
//! # Due rule
//!
//! | Condition                               | Evaluated in        |
//! |-----------------------------------------|---------------------|
//! | local time ≥ `schedule_time`            | the job's timezone  |
//! | `last_run` is null or on another day    | the job's timezone  |
//!
//! A job therefore runs at most once per local calendar day, some time after
//! its scheduled time. Failed runs leave `last_run` untouched so the next
//! invocation picks the job up again.

pub mod db;
pub mod error;
pub mod memory;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod types;

pub use db::SqliteJobStore;
pub use error::{JobFailure, Result, SchedulerError};
pub use memory::MemoryJobStore;
pub use runner::Runner;
pub use store::JobStore;
pub use types::{FailureKind, JobOutcome, JobRecord, OutcomeStatus, RunReport};
