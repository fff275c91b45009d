//! Incident response playbook execution engine.
//!
//! Playbooks are ordered lists of remediation steps. The engine stores them
//! in a [`playbooks::PlaybookCatalog`], runs them against incidents on
//! background tasks and keeps a bounded history of executions that callers
//! poll for progress. [`playbooks::PlaybookService`] is the entry point.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod playbooks;

pub use error::{AppError, Result};
