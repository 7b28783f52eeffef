//! Failure classification for tracker responses.
//!
//! Maps an HTTP status (or its absence, for pure network failures) plus the
//! error body into a structured verdict. The verdict drives the engine's
//! retry policy short-term and the backoff controller's cadence long-term.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Stable error codes for tracker failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JiraErrorCode {
    /// The tracker subscription is suspended (payment lapse); syncing is
    /// pointless until resolved.
    SuspendedPayment,
    /// Request never reached the tracker (DNS, TCP, TLS, timeout).
    Network,
    RateLimit,
    ServerError,
    BadRequest,
    Unauthorized,
    Forbidden,
    UnexpectedStatus,
    /// Non-tracker failure surfaced through the same reporting path.
    Unknown,
}

impl JiraErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JiraErrorCode::SuspendedPayment => "SUSPENDED_PAYMENT",
            JiraErrorCode::Network => "NETWORK",
            JiraErrorCode::RateLimit => "RATE_LIMIT",
            JiraErrorCode::ServerError => "SERVER_ERROR",
            JiraErrorCode::BadRequest => "BAD_REQUEST",
            JiraErrorCode::Unauthorized => "UNAUTHORIZED",
            JiraErrorCode::Forbidden => "FORBIDDEN",
            JiraErrorCode::UnexpectedStatus => "UNEXPECTED_STATUS",
            JiraErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for JiraErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    Info,
    Warn,
    Error,
}

/// Structured verdict on a failed tracker call.
///
/// Never persisted on its own; embedded into sync log detail payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraErrorClassification {
    pub code: JiraErrorCode,
    pub message: String,
    pub retryable: bool,
    pub severity: ErrorSeverity,
}

impl std::fmt::Display for JiraErrorClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl JiraErrorClassification {
    pub fn new(
        code: JiraErrorCode,
        message: impl Into<String>,
        retryable: bool,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            severity,
        }
    }
}

/// Error code Jira returns in the body when the site subscription lapsed.
const SUSPENDED_PAYMENT_ERROR_CODE: &str = "SUSPENDED_PAYMENT";

/// Classify a failed tracker call.
///
/// `status` is `None` when the request never produced an HTTP response.
pub fn classify(status: Option<u16>, body: &JsonValue, message: &str) -> JiraErrorClassification {
    use ErrorSeverity::{Error, Warn};
    use JiraErrorCode::*;

    let Some(status) = status else {
        return JiraErrorClassification::new(Network, message, true, Error);
    };

    match status {
        403 if has_error_code(body, SUSPENDED_PAYMENT_ERROR_CODE) => {
            JiraErrorClassification::new(SuspendedPayment, message, false, Error)
        }
        403 => JiraErrorClassification::new(Forbidden, message, false, Error),
        429 => JiraErrorClassification::new(RateLimit, message, true, Warn),
        401 => JiraErrorClassification::new(Unauthorized, message, false, Error),
        400 => JiraErrorClassification::new(BadRequest, message, false, Error),
        s if s >= 500 => JiraErrorClassification::new(ServerError, message, true, Error),
        _ => JiraErrorClassification::new(UnexpectedStatus, message, false, Error),
    }
}

fn has_error_code(body: &JsonValue, code: &str) -> bool {
    body.get("errorCode")
        .and_then(JsonValue::as_str)
        .is_some_and(|value| value.eq_ignore_ascii_case(code))
}
