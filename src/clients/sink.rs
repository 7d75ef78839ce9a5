use std::time::Duration;

use crate::clients::{read_json, transport_error, Project, SinkTask, TaskRequest, TaskSink};
use crate::error::{Error, Result};

/// Hosted task-sink endpoint used unless a deployment overrides it.
pub const DEFAULT_SINK_BASE_URL: &str = "https://api.todoist.com/rest/v2";

/// Client for the task-manager REST API.
///
/// `create_task` is the single write path of the whole engine; the
/// listing calls exist for destination validation and status views.
#[derive(Debug, Clone)]
pub struct TaskSinkClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TaskSinkClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_SINK_BASE_URL, token, timeout)
    }

    /// Point the client at a non-default endpoint (self-hosted sink or
    /// a local mock).
    pub fn with_base_url(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::Config("task sink token is empty".into()));
        }
        url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid task sink base URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }
}

impl TaskSink for TaskSinkClient {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        let response = self
            .http
            .get(format!("{}/projects", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }

    async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<SinkTask>> {
        let mut request = self
            .http
            .get(format!("{}/tasks", self.base_url))
            .bearer_auth(&self.token);
        if let Some(pid) = project_id {
            request = request.query(&[("project_id", pid)]);
        }
        let response = request.send().await.map_err(transport_error)?;
        read_json(response).await
    }

    async fn create_task(&self, request: &TaskRequest) -> Result<SinkTask> {
        let response = self
            .http
            .post(format!("{}/tasks", self.base_url))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> TaskSinkClient {
        TaskSinkClient::with_base_url(base_url, "sink-token", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rejects_empty_token() {
        let err = TaskSinkClient::new("", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn lists_projects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/projects"))
            .and(header("Authorization", "Bearer sink-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "p1", "name": "School"},
                {"id": "p2", "name": "Inbox"}
            ])))
            .mount(&server)
            .await;

        let projects = client(&server.uri()).list_projects().await.unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].id, "p1");
    }

    #[tokio::test]
    async fn lists_tasks_filtered_by_project() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(query_param("project_id", "p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "t1", "content": "[Biology] HW1", "project_id": "p1"}
            ])))
            .mount(&server)
            .await;

        let tasks = client(&server.uri()).list_tasks(Some("p1")).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn create_task_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(header("Authorization", "Bearer sink-token"))
            .and(body_partial_json(serde_json::json!({
                "content": "[Biology] HW1",
                "due_date": "2024-03-15",
                "priority": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"id": "t9", "content": "[Biology] HW1", "project_id": "p1"}
            )))
            .expect(1)
            .mount(&server)
            .await;

        let request = TaskRequest {
            content: "[Biology] HW1".to_string(),
            due_date: Some("2024-03-15".to_string()),
            priority: Some(3),
            labels: vec!["coursesync".to_string()],
            project_id: Some("p1".to_string()),
            description: None,
        };
        let task = client(&server.uri()).create_task(&request).await.unwrap();
        assert_eq!(task.id, "t9");
    }

    #[tokio::test]
    async fn create_task_maps_403_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let request = TaskRequest {
            content: "x".to_string(),
            due_date: None,
            priority: None,
            labels: Vec::new(),
            project_id: None,
            description: None,
        };
        let err = client(&server.uri()).create_task(&request).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got: {err:?}");
    }
}
