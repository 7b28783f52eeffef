//! Tracker remote client.
//!
//! Issues authenticated search requests against the Jira Cloud API and
//! classifies failures into the typed taxonomy the backoff controller and
//! sync log consume.

pub mod classify;
mod client;

pub use classify::{ErrorSeverity, JiraErrorClassification, JiraErrorCode, classify};
pub use client::{
    JiraClient, JiraCredentials, RemoteComment, RemoteIssue, RemoteWorklog, SearchPage,
};

/// A failed tracker call, carrying its classification verdict.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{classification}")]
pub struct JiraError {
    pub classification: JiraErrorClassification,
    /// Retry delay hinted by the tracker (seconds), when present.
    pub retry_after_secs: Option<u64>,
}

impl JiraError {
    pub fn new(classification: JiraErrorClassification) -> Self {
        Self {
            classification,
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }

    pub fn retryable(&self) -> bool {
        self.classification.retryable
    }
}
