//! HTTP client for the Jira Cloud search API.
//!
//! Speaks the paged `search/jql` endpoint with basic auth and returns typed
//! pages. All failures come back as [`JiraError`] carrying a classification,
//! so callers never inspect HTTP statuses themselves.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde_json::{Value as JsonValue, json};
use tracing::debug;
use url::Url;

use super::classify::{ErrorSeverity, JiraErrorClassification, JiraErrorCode};
use super::{JiraError, classify};

const SEARCH_PATH: &str = "/rest/api/3/search/jql";

/// Issue fields requested on every search page. Comments and worklogs come
/// back embedded so one page fetch covers all three tracked entities.
const SEARCH_FIELDS: [&str; 6] = [
    "summary",
    "status",
    "assignee",
    "updated",
    "comment",
    "worklog",
];

/// Basic-auth credentials for the tracker API.
#[derive(Debug, Clone)]
pub struct JiraCredentials {
    pub email: String,
    pub api_token: String,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub issues: Vec<RemoteIssue>,
    /// Opaque continuation token; `None` on the last page.
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteIssue {
    pub id: String,
    pub key: String,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub assignee_account_id: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub comments: Vec<RemoteComment>,
    pub worklogs: Vec<RemoteWorklog>,
}

#[derive(Debug, Clone)]
pub struct RemoteComment {
    pub id: String,
    pub author_account_id: Option<String>,
    pub body: JsonValue,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RemoteWorklog {
    pub id: String,
    pub author_account_id: Option<String>,
    pub time_spent_seconds: Option<i64>,
    pub started: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Tracker API client scoped to one site.
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    credentials: JiraCredentials,
}

impl JiraClient {
    pub fn new(base_url: impl Into<String>, credentials: JiraCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Run one page of the given JQL search.
    ///
    /// Pass the previous page's token to continue; `None` starts from the
    /// beginning.
    pub async fn search(
        &self,
        jql: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<SearchPage, JiraError> {
        let url = self.search_url()?;

        let mut body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": SEARCH_FIELDS,
        });
        if let Some(token) = page_token {
            body["nextPageToken"] = json!(token);
        }

        let response = self
            .http
            .post(url)
            .basic_auth(&self.credentials.email, Some(&self.credentials.api_token))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                JiraError::new(classify(
                    None,
                    &JsonValue::Null,
                    &format!("tracker request failed: {err}"),
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let error_body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);
            let message = format!("tracker search returned HTTP {}", status.as_u16());
            return Err(
                JiraError::new(classify(Some(status.as_u16()), &error_body, &message))
                    .with_retry_after(retry_after),
            );
        }

        let payload: JsonValue = response.json().await.map_err(|err| {
            JiraError::new(JiraErrorClassification::new(
                JiraErrorCode::Unknown,
                format!("malformed tracker response: {err}"),
                true,
                ErrorSeverity::Error,
            ))
        })?;

        let page = parse_search_page(&payload);
        debug!(
            issues = page.issues.len(),
            has_more = page.next_page_token.is_some(),
            "Fetched tracker search page"
        );
        Ok(page)
    }

    fn search_url(&self) -> Result<Url, JiraError> {
        Url::parse(&format!("{}{}", self.base_url, SEARCH_PATH)).map_err(|err| {
            JiraError::new(JiraErrorClassification::new(
                JiraErrorCode::BadRequest,
                format!("invalid tracker base url '{}': {err}", self.base_url),
                false,
                ErrorSeverity::Error,
            ))
        })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("Retry-After")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

fn parse_search_page(payload: &JsonValue) -> SearchPage {
    let issues = payload
        .get("issues")
        .and_then(JsonValue::as_array)
        .map(|values| values.iter().map(parse_issue).collect())
        .unwrap_or_default();
    let next_page_token = payload
        .get("nextPageToken")
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    SearchPage {
        issues,
        next_page_token,
    }
}

fn parse_issue(value: &JsonValue) -> RemoteIssue {
    let fields = value.get("fields").unwrap_or(&JsonValue::Null);

    let comments = fields
        .get("comment")
        .and_then(|c| c.get("comments"))
        .and_then(JsonValue::as_array)
        .map(|values| values.iter().map(parse_comment).collect())
        .unwrap_or_default();

    let worklogs = fields
        .get("worklog")
        .and_then(|w| w.get("worklogs"))
        .and_then(JsonValue::as_array)
        .map(|values| values.iter().map(parse_worklog).collect())
        .unwrap_or_default();

    RemoteIssue {
        id: string_at(value, "id"),
        key: string_at(value, "key"),
        summary: opt_string(fields.get("summary")),
        status: opt_string(fields.get("status").and_then(|s| s.get("name"))),
        assignee_account_id: opt_string(fields.get("assignee").and_then(|a| a.get("accountId"))),
        updated: fields
            .get("updated")
            .and_then(JsonValue::as_str)
            .and_then(parse_remote_timestamp),
        comments,
        worklogs,
    }
}

fn parse_comment(value: &JsonValue) -> RemoteComment {
    RemoteComment {
        id: string_at(value, "id"),
        author_account_id: opt_string(value.get("author").and_then(|a| a.get("accountId"))),
        body: value.get("body").cloned().unwrap_or(JsonValue::Null),
        updated: value
            .get("updated")
            .or_else(|| value.get("created"))
            .and_then(JsonValue::as_str)
            .and_then(parse_remote_timestamp),
    }
}

fn parse_worklog(value: &JsonValue) -> RemoteWorklog {
    RemoteWorklog {
        id: string_at(value, "id"),
        author_account_id: opt_string(value.get("author").and_then(|a| a.get("accountId"))),
        time_spent_seconds: value.get("timeSpentSeconds").and_then(JsonValue::as_i64),
        started: value
            .get("started")
            .and_then(JsonValue::as_str)
            .and_then(parse_remote_timestamp),
        updated: value
            .get("updated")
            .and_then(JsonValue::as_str)
            .and_then(parse_remote_timestamp),
    }
}

fn string_at(value: &JsonValue, key: &str) -> String {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_string(value: Option<&JsonValue>) -> Option<String> {
    value.and_then(JsonValue::as_str).map(str::to_string)
}

/// Parse a tracker timestamp.
///
/// Jira emits `2024-01-15T10:30:00.000+0000` (no colon in the offset), which
/// strict RFC 3339 parsing rejects.
pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
