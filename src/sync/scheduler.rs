//! Periodic scheduling: a fixed-interval tick that finds due users and
//! hands them to the coordinator one at a time.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::credentials::EntitlementCheck;
use crate::error::{Error, Result};
use crate::storage::{repository, Database};
use crate::sync::coordinator::SyncCoordinator;
use crate::sync::{RunKind, RunResult};

/// How often a user's scheduled sync runs. The set is closed; anything
/// else is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    pub fn interval(self) -> Duration {
        match self {
            Frequency::Hourly => Duration::seconds(3600),
            Frequency::Daily => Duration::seconds(86400),
            Frequency::Weekly => Duration::seconds(604800),
        }
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(Error::InvalidFrequency(other.to_string())),
        }
    }
}

/// One user's sync settings as stored in `sync_prefs`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncPreference {
    pub user_id: i64,
    pub enabled: bool,
    pub frequency: Frequency,
    pub last_run_at: Option<DateTime<Utc>>,
    pub course_id: Option<String>,
    pub project_id: Option<String>,
}

impl SyncPreference {
    /// Default settings for a user who has never saved any: disabled,
    /// daily, nothing selected.
    pub fn defaults(user_id: i64) -> Self {
        Self {
            user_id,
            enabled: false,
            frequency: Frequency::Daily,
            last_run_at: None,
            course_id: None,
            project_id: None,
        }
    }
}

/// Whether a preference is due at `now`. Pure so the clock can be
/// pinned in tests. The boundary is inclusive: exactly one interval
/// since the last run counts as due.
pub fn is_due(pref: &SyncPreference, entitled: bool, now: DateTime<Utc>) -> bool {
    if !pref.enabled || !entitled {
        return false;
    }
    match pref.last_run_at {
        None => true,
        Some(last_run) => now - last_run >= pref.frequency.interval(),
    }
}

/// Drives scheduled syncs. Each tick reads the enabled preferences,
/// filters to due + entitled users, and runs them sequentially.
pub struct Scheduler {
    db: Database,
    coordinator: SyncCoordinator,
    entitlements: Arc<dyn EntitlementCheck>,
    tick_interval: StdDuration,
}

impl Scheduler {
    pub fn new(
        db: Database,
        coordinator: SyncCoordinator,
        entitlements: Arc<dyn EntitlementCheck>,
        tick_interval: StdDuration,
    ) -> Self {
        Self {
            db,
            coordinator,
            entitlements,
            tick_interval,
        }
    }

    /// Enabled preferences that are due at `now` for an entitled user.
    pub async fn due_users(&self, now: DateTime<Utc>) -> Result<Vec<SyncPreference>> {
        let prefs = self
            .db
            .reader()
            .call(|conn| repository::list_enabled_preferences(conn))
            .await?;
        Ok(prefs
            .into_iter()
            .filter(|pref| is_due(pref, self.entitlements.is_entitled(pref.user_id, now), now))
            .collect())
    }

    /// Run one scheduling pass. Provider failures are absorbed into the
    /// per-user run results; only a ledger write failure aborts the
    /// tick, since without the ledger no outcome can be recorded.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<RunResult>> {
        let due = self.due_users(now).await?;
        if !due.is_empty() {
            log::info!("{} user(s) due for scheduled sync", due.len());
        }

        let mut results = Vec::with_capacity(due.len());
        for pref in &due {
            let Some(course_id) = pref.course_id.as_deref() else {
                log::debug!("user {} is due but has no course selected", pref.user_id);
                continue;
            };
            let result = self
                .coordinator
                .run(
                    pref.user_id,
                    course_id,
                    pref.project_id.as_deref(),
                    RunKind::Scheduled,
                )
                .await?;
            results.push(result);
        }
        Ok(results)
    }

    /// Tick forever at the configured interval. A failed tick is logged
    /// and the loop keeps going; the next tick picks the same users up
    /// again.
    pub async fn run_forever(&self) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(results) => {
                    if !results.is_empty() {
                        log::info!("tick completed: {} run(s)", results.len());
                    }
                }
                Err(e) => log::error!("tick abandoned: {e}"),
            }
        }
    }
}
