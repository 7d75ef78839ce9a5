pub mod course;
pub mod sink;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use course::CourseClient;
pub use sink::{TaskSinkClient, DEFAULT_SINK_BASE_URL};

/// How much of an error response body is kept for diagnostics.
const BODY_SNIPPET_LEN: usize = 512;

/// Read-only access to the course provider. Both listing calls are safe
/// to repeat; they have no side effects.
#[allow(async_fn_in_trait)]
pub trait CourseSource {
    async fn list_courses(&self) -> Result<Vec<Course>>;
    async fn list_assignments(&self, course_id: &str) -> Result<Vec<Assignment>>;
}

/// The task-manager side. `create_task` is the only call in the engine
/// with an external side effect.
#[allow(async_fn_in_trait)]
pub trait TaskSink {
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<SinkTask>>;
    async fn create_task(&self, request: &TaskRequest) -> Result<SinkTask>;
}

// ── Course provider records ────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub term: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub name: String,
    /// Z-suffixed ISO-8601 timestamp, as delivered by the provider.
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub submitted_at: Option<String>,
}

// ── Task sink records ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkTask {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Task creation payload. Produced by the mapper, posted by the sink client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Shared response handling ───────────────────────────────────────

/// Classify a failed `send()`. Timeouts and connection refusals are
/// retryable on the next scheduled run; everything else from the
/// transport layer is treated the same way.
pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    Error::Transient(e.to_string())
}

/// Decode a provider response, mapping non-2xx statuses onto the error
/// taxonomy: 401/403 are authentication rejections, anything else keeps
/// the status code and a truncated body for diagnostics.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| Error::Provider {
            status: status.as_u16(),
            body: format!("undecodable response body: {e}"),
        });
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Auth(format!("provider returned HTTP {status}")));
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Provider {
        status: status.as_u16(),
        body: snippet(&body),
    })
}

fn snippet(body: &str) -> String {
    let mut end = body.len().min(BODY_SNIPPET_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_request_omits_empty_fields() {
        let req = TaskRequest {
            content: "HW1".to_string(),
            due_date: None,
            priority: None,
            labels: Vec::new(),
            project_id: None,
            description: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"content": "HW1"}));
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let body = "é".repeat(600);
        let s = snippet(&body);
        assert!(s.len() <= BODY_SNIPPET_LEN);
        assert!(body.starts_with(&s));
    }
}
