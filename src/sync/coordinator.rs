//! The run protocol: fetch → map → write → record, with per-item
//! failure isolation and a single atomic ledger commit per run.

use std::sync::Arc;

use chrono::Utc;

use crate::clients::{CourseClient, CourseSource, TaskSink, TaskSinkClient};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::mapper::map_assignment;
use crate::storage::{repository, Database};
use crate::sync::{ItemFailure, RunKind, RunResult, RunStatus};
use crate::EngineConfig;

/// Executes sync runs for one (user, course, destination) tuple at a
/// time and owns the only writes the engine makes: the ledger append
/// and the `last_run_at` update, committed together.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    credentials: Arc<dyn CredentialStore>,
    config: EngineConfig,
}

/// Pre-persistence outcome of the fetch/map/write phase.
#[derive(Debug, Default)]
pub(crate) struct SyncAttempt {
    attempted: u64,
    failures: Vec<ItemFailure>,
    aborted: bool,
}

impl SyncAttempt {
    /// A run that never reached the per-item loop: bad credentials,
    /// auth rejection, read failure, or an exhausted time budget.
    fn abort(reason: String) -> Self {
        Self {
            attempted: 0,
            failures: vec![ItemFailure {
                assignment_id: None,
                reason,
            }],
            aborted: true,
        }
    }

    fn succeeded(&self) -> u64 {
        self.attempted.saturating_sub(self.failures.len() as u64)
    }

    fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Failed
        } else if self.failures.is_empty() {
            // Covers attempted == 0: nothing to do is still a clean run.
            RunStatus::Success
        } else if (self.failures.len() as u64) < self.attempted {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        }
    }

    fn into_result(self) -> RunResult {
        RunResult {
            status: self.status(),
            attempted: self.attempted,
            succeeded: self.succeeded(),
            failures: self.failures,
        }
    }
}

/// Fetch, map, and write one course's assignments. Item writes happen
/// in the source's listing order; one bad item never stops the loop.
pub(crate) async fn execute_run<C: CourseSource, S: TaskSink>(
    source: &C,
    sink: &S,
    course_id: &str,
    project_id: Option<&str>,
    config: &EngineConfig,
) -> SyncAttempt {
    // Course name resolution: a miss is fine (tasks just lose their
    // course prefix), but a failing read call aborts the run.
    let courses = match source.list_courses().await {
        Ok(courses) => courses,
        Err(e) => return SyncAttempt::abort(format!("course listing failed: {e}")),
    };
    let course_name = courses
        .iter()
        .find(|c| c.id.to_string() == course_id)
        .map(|c| c.name.clone());
    if course_name.is_none() {
        log::debug!("course {course_id} not in listing; proceeding without a display name");
    }

    let assignments = match source.list_assignments(course_id).await {
        Ok(assignments) => assignments,
        Err(e) => return SyncAttempt::abort(format!("assignment listing failed: {e}")),
    };

    let mut attempt = SyncAttempt::default();
    for assignment in &assignments {
        let Some(mut request) = map_assignment(assignment, course_name.as_deref(), &config.mapper)
        else {
            continue;
        };
        if let Some(pid) = project_id {
            request.project_id = Some(pid.to_string());
        }
        attempt.attempted += 1;
        if let Err(e) = sink.create_task(&request).await {
            log::warn!("create_task failed for assignment {}: {e}", assignment.id);
            attempt.failures.push(ItemFailure {
                assignment_id: Some(assignment.id),
                reason: e.to_string(),
            });
        }
    }
    attempt
}

impl SyncCoordinator {
    pub fn new(db: Database, credentials: Arc<dyn CredentialStore>, config: EngineConfig) -> Self {
        Self {
            db,
            credentials,
            config,
        }
    }

    pub(crate) fn course_client(&self, user_id: i64) -> Result<CourseClient> {
        let base_url = self
            .credentials
            .course_base_url(user_id)
            .ok_or_else(|| Error::Config("course provider base URL is not configured".into()))?;
        let secret = self
            .credentials
            .course_secret(user_id)
            .ok_or_else(|| Error::Config("course provider token is not configured".into()))?;
        CourseClient::new(&base_url, &secret, self.config.http_timeout)
    }

    pub(crate) fn sink_client(&self, user_id: i64) -> Result<TaskSinkClient> {
        let secret = self
            .credentials
            .sink_secret(user_id)
            .ok_or_else(|| Error::Config("task sink token is not configured".into()))?;
        TaskSinkClient::with_base_url(&self.config.sink_base_url, &secret, self.config.http_timeout)
    }

    /// Execute one sync run and record its outcome.
    ///
    /// Provider failures of any kind end up inside the returned
    /// `RunResult`; the only error this returns is a failure to write
    /// the ledger, which callers must treat as catastrophic. The ledger
    /// append and the `last_run_at` advance commit in one transaction,
    /// so a crash mid-run never leaves one without the other.
    pub async fn run(
        &self,
        user_id: i64,
        course_id: &str,
        project_id: Option<&str>,
        kind: RunKind,
    ) -> Result<RunResult> {
        let started_at = Utc::now();

        let attempt = match self.build_clients(user_id) {
            Ok((source, sink)) => {
                let work = execute_run(&source, &sink, course_id, project_id, &self.config);
                match tokio::time::timeout(self.config.run_budget, work).await {
                    Ok(attempt) => attempt,
                    Err(_) => SyncAttempt::abort(format!(
                        "run exceeded the {}s wall-clock budget",
                        self.config.run_budget.as_secs()
                    )),
                }
            }
            Err(e) => SyncAttempt::abort(e.to_string()),
        };

        let completed_at = Utc::now();
        let result = attempt.into_result();

        let detail = serde_json::json!({
            "course_id": course_id,
            "project_id": project_id,
            "attempted": result.attempted,
            "succeeded": result.succeeded,
            "first_error": result.failures.first().map(|f| f.reason.clone()),
        })
        .to_string();
        let record = repository::RunRecord {
            id: 0,
            user_id,
            kind,
            status: result.status,
            items_attempted: result.attempted,
            items_succeeded: result.succeeded,
            started_at: repository::format_ts(started_at),
            completed_at: Some(repository::format_ts(completed_at)),
            detail: Some(detail),
        };
        let last_run = repository::format_ts(completed_at);

        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                repository::insert_run(&tx, &record)?;
                repository::touch_last_run(&tx, user_id, &last_run)?;
                tx.commit()
            })
            .await?;

        log::info!(
            "sync run for user {user_id} course {course_id}: {} ({}/{} items)",
            result.status.as_str(),
            result.succeeded,
            result.attempted,
        );
        Ok(result)
    }

    fn build_clients(&self, user_id: i64) -> Result<(CourseClient, TaskSinkClient)> {
        Ok((self.course_client(user_id)?, self.sink_client(user_id)?))
    }
}
