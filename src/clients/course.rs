use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::clients::{read_json, transport_error, Assignment, Course, CourseSource};
use crate::error::{Error, Result};

/// Maximum page size the provider allows; listing calls loop until a
/// short page so results are never silently truncated.
const PAGE_SIZE: usize = 100;

/// Client for the course provider's REST API.
///
/// Constructed per user from that user's base URL and bearer secret;
/// all calls here are read-only.
#[derive(Debug, Clone)]
pub struct CourseClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CourseClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::Config("course provider token is empty".into()));
        }
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid course provider base URL: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Config(format!(
                "course provider base URL must be http(s), got {:?}",
                parsed.scheme()
            )));
        }
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

    /// Fetch every page of a listing endpoint. A page shorter than
    /// `PAGE_SIZE` marks the end.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let per_page = PAGE_SIZE.to_string();
        let url = format!("{}{path}", self.base_url);
        let mut page = 1usize;
        let mut items: Vec<T> = Vec::new();
        loop {
            let page_param = page.to_string();
            let mut query: Vec<(&str, &str)> =
                vec![("per_page", &per_page), ("page", &page_param)];
            query.extend_from_slice(extra);

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;
            let batch: Vec<T> = read_json(response).await?;
            let batch_len = batch.len();
            items.extend(batch);
            if batch_len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        Ok(items)
    }
}

impl CourseSource for CourseClient {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.get_all("/courses", &[("enrollment_state", "active")])
            .await
    }

    async fn list_assignments(&self, course_id: &str) -> Result<Vec<Assignment>> {
        // The submission object rides along so the mapper can skip
        // already-submitted assignments.
        self.get_all(
            &format!("/courses/{course_id}/assignments"),
            &[("include[]", "submission"), ("order_by", "due_at")],
        )
        .await
    }
}
