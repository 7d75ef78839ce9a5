//! coursesync — an engine that mirrors course assignments from a
//! learning-management provider into a task manager.
//!
//! The engine owns the fetch/map/write pipeline, a periodic scheduler,
//! per-user sync preferences, and an append-only run ledger in SQLite.
//! Credential storage and entitlement policy are injected by the host
//! through the [`credentials`] traits.

pub mod clients;
pub mod credentials;
pub mod error;
pub mod mapper;
pub mod storage;
pub mod sync;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use clients::{
    Assignment, Course, CourseClient, CourseSource, Project, SinkTask, TaskRequest, TaskSink,
    TaskSinkClient, DEFAULT_SINK_BASE_URL,
};
pub use credentials::{AllowAll, CredentialStore, EntitlementCheck, EnvCredentialStore};
pub use error::{Error, Result};
pub use mapper::{map_assignment, MapperConfig, PriorityTiers};
pub use storage::repository::{RunRecord, RunStats};
pub use storage::Database;
pub use sync::coordinator::SyncCoordinator;
pub use sync::scheduler::{is_due, Frequency, Scheduler, SyncPreference};
pub use sync::{ItemFailure, RunKind, RunResult, RunStatus};

use storage::repository;

/// Engine-wide knobs. The defaults match a small self-hosted install;
/// tests override `sink_base_url` and the budgets.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-request HTTP timeout for both provider clients.
    pub http_timeout: Duration,
    /// Wall-clock budget for one whole sync run. A run that exceeds it
    /// is cut off and recorded as failed.
    pub run_budget: Duration,
    /// How often the scheduler wakes up to look for due users.
    pub tick_interval: Duration,
    pub mapper: MapperConfig,
    pub sink_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            run_budget: Duration::from_secs(300),
            tick_interval: Duration::from_secs(900),
            mapper: MapperConfig::default(),
            sink_base_url: DEFAULT_SINK_BASE_URL.to_string(),
        }
    }
}

/// Facade over the storage, coordinator, and scheduler layers. Cheap to
/// clone; all clones share the same database connections.
#[derive(Clone)]
pub struct SyncEngine {
    db: Database,
    credentials: Arc<dyn CredentialStore>,
    entitlements: Arc<dyn EntitlementCheck>,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        credentials: Arc<dyn CredentialStore>,
        entitlements: Arc<dyn EntitlementCheck>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            credentials,
            entitlements,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn coordinator(&self) -> SyncCoordinator {
        SyncCoordinator::new(self.db.clone(), self.credentials.clone(), self.config.clone())
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.db.clone(),
            self.coordinator(),
            self.entitlements.clone(),
            self.config.tick_interval,
        )
    }

    /// Run one sync now, regardless of schedule or entitlement. The
    /// outcome is ledgered exactly like a scheduled run.
    pub async fn trigger_manual_sync(
        &self,
        user_id: i64,
        course_id: &str,
        project_id: Option<&str>,
    ) -> Result<RunResult> {
        self.coordinator()
            .run(user_id, course_id, project_id, RunKind::Manual)
            .await
    }

    pub async fn get_history(&self, user_id: i64, limit: u32) -> Result<Vec<RunRecord>> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::recent_runs(conn, user_id, limit))
            .await?)
    }

    pub async fn get_stats(&self, user_id: i64) -> Result<RunStats> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::run_stats(conn, user_id))
            .await?)
    }

    /// Delete a user's entire run history. Irreversible; interactive
    /// callers should confirm first.
    pub async fn clear_history(&self, user_id: i64) -> Result<usize> {
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::clear_runs(conn, user_id))
            .await?)
    }

    /// Stored preference, or the defaults if the user never saved one.
    pub async fn get_preference(&self, user_id: i64) -> Result<SyncPreference> {
        let stored = self
            .db
            .reader()
            .call(move |conn| repository::get_preference(conn, user_id))
            .await?;
        Ok(stored.unwrap_or_else(|| SyncPreference::defaults(user_id)))
    }

    pub async fn set_preference(&self, pref: SyncPreference) -> Result<()> {
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::upsert_preference(conn, &pref))
            .await?)
    }

    /// Preferences that would sync if a tick happened at `now`.
    pub async fn get_due_users(&self, now: DateTime<Utc>) -> Result<Vec<SyncPreference>> {
        self.scheduler().due_users(now).await
    }

    /// Active courses visible with the user's course credentials.
    pub async fn list_courses(&self, user_id: i64) -> Result<Vec<Course>> {
        self.coordinator()
            .course_client(user_id)?
            .list_courses()
            .await
    }

    /// Destination projects in the user's task manager.
    pub async fn list_projects(&self, user_id: i64) -> Result<Vec<Project>> {
        self.coordinator().sink_client(user_id)?.list_projects().await
    }

    /// Whether `project_id` still exists in the task manager. Used
    /// before saving a preference that points tasks at it.
    pub async fn verify_destination(&self, user_id: i64, project_id: &str) -> Result<bool> {
        let projects = self.list_projects(user_id).await?;
        Ok(projects.iter().any(|p| p.id == project_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(db: Database) -> SyncEngine {
        struct NoCredentials;
        impl CredentialStore for NoCredentials {
            fn course_base_url(&self, _user_id: i64) -> Option<String> {
                None
            }
            fn course_secret(&self, _user_id: i64) -> Option<String> {
                None
            }
            fn sink_secret(&self, _user_id: i64) -> Option<String> {
                None
            }
        }
        SyncEngine::new(
            db,
            Arc::new(NoCredentials),
            Arc::new(AllowAll),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn unset_preference_reads_back_as_defaults() {
        let engine = engine(Database::open_memory().await.unwrap());
        let pref = engine.get_preference(5).await.unwrap();
        assert_eq!(pref.user_id, 5);
        assert!(!pref.enabled);
        assert_eq!(pref.frequency, Frequency::Daily);
        assert!(pref.last_run_at.is_none());
    }

    #[tokio::test]
    async fn saved_preference_shows_up_in_due_users() {
        let engine = engine(Database::open_memory().await.unwrap());
        let mut pref = SyncPreference::defaults(1);
        pref.enabled = true;
        pref.frequency = Frequency::Hourly;
        pref.course_id = Some("42".to_string());
        engine.set_preference(pref).await.unwrap();

        let due = engine.get_due_users(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, 1);
    }

    #[tokio::test]
    async fn stats_and_history_start_empty() {
        let engine = engine(Database::open_memory().await.unwrap());
        assert_eq!(engine.get_stats(1).await.unwrap(), RunStats::default());
        assert!(engine.get_history(1, 10).await.unwrap().is_empty());
        assert_eq!(engine.clear_history(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn manual_sync_without_credentials_is_ledgered_as_failed() {
        let engine = engine(Database::open_memory().await.unwrap());
        let result = engine.trigger_manual_sync(1, "42", None).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);

        let history = engine.get_history(1, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, RunKind::Manual);

        let stats = engine.get_stats(1).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.failed, 1);
    }
}
