use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::sync::scheduler::{Frequency, SyncPreference};
use crate::sync::{RunKind, RunStatus};

/// Canonical timestamp format for every stored instant. A single format
/// keeps lexicographic comparison (the monotonic last_run guard) valid.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Sync preferences ───────────────────────────────────────────────

/// Create or update a user's sync preference. `last_run_at` is owned by
/// the run coordinator and deliberately left untouched here.
pub fn upsert_preference(
    conn: &Connection,
    pref: &SyncPreference,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_prefs (user_id, enabled, frequency, course_id, project_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
         ON CONFLICT(user_id) DO UPDATE SET
           enabled = excluded.enabled,
           frequency = excluded.frequency,
           course_id = excluded.course_id,
           project_id = excluded.project_id,
           updated_at = excluded.updated_at",
        params![
            pref.user_id,
            pref.enabled as i32,
            pref.frequency.as_str(),
            pref.course_id,
            pref.project_id,
        ],
    )?;
    Ok(())
}

pub fn get_preference(
    conn: &Connection,
    user_id: i64,
) -> Result<Option<SyncPreference>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, enabled, frequency, last_run_at, course_id, project_id
         FROM sync_prefs WHERE user_id = ?1",
        params![user_id],
        preference_from_row,
    )
    .optional()
}

pub fn list_enabled_preferences(
    conn: &Connection,
) -> Result<Vec<SyncPreference>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT user_id, enabled, frequency, last_run_at, course_id, project_id
         FROM sync_prefs WHERE enabled = 1 ORDER BY user_id",
    )?;
    let rows = stmt.query_map([], preference_from_row)?;
    rows.collect()
}

fn preference_from_row(row: &rusqlite::Row<'_>) -> Result<SyncPreference, rusqlite::Error> {
    let frequency_raw: String = row.get(2)?;
    let frequency = frequency_raw.parse::<Frequency>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let last_run_raw: Option<String> = row.get(3)?;
    Ok(SyncPreference {
        user_id: row.get(0)?,
        enabled: row.get(1)?,
        frequency,
        // An unreadable stored timestamp behaves like "never ran".
        last_run_at: last_run_raw.as_deref().and_then(parse_ts),
        course_id: row.get(4)?,
        project_id: row.get(5)?,
    })
}

/// Advance `last_run_at`, inserting the row if the user has never saved
/// preferences. The guard keeps the column monotonically non-decreasing
/// even if runs finish out of order.
pub fn touch_last_run(
    conn: &Connection,
    user_id: i64,
    completed_at: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_prefs (user_id, enabled, last_run_at, updated_at)
         VALUES (?1, 0, ?2, datetime('now'))
         ON CONFLICT(user_id) DO UPDATE SET
           last_run_at = CASE
             WHEN sync_prefs.last_run_at IS NULL OR sync_prefs.last_run_at < excluded.last_run_at
             THEN excluded.last_run_at
             ELSE sync_prefs.last_run_at
           END,
           updated_at = excluded.updated_at",
        params![user_id, completed_at],
    )?;
    Ok(())
}

// ── Run ledger ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: RunKind,
    pub status: RunStatus,
    pub items_attempted: u64,
    pub items_succeeded: u64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    pub total: u64,
    pub succeeded: u64,
    pub partial: u64,
    pub failed: u64,
    pub items_synced: u64,
}

/// Append one completed run to the ledger. This is the ledger's only
/// insert path; rows are never updated afterwards.
pub fn insert_run(conn: &Connection, record: &RunRecord) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (
            user_id, kind, status, items_attempted, items_succeeded,
            started_at, completed_at, detail
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.user_id,
            record.kind.as_str(),
            record.status.as_str(),
            record.items_attempted as i64,
            record.items_succeeded as i64,
            record.started_at,
            record.completed_at,
            record.detail,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most-recent-first run history for one user.
pub fn recent_runs(
    conn: &Connection,
    user_id: i64,
    limit: u32,
) -> Result<Vec<RunRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, status,
                COALESCE(items_attempted, 0), COALESCE(items_succeeded, 0),
                started_at, completed_at, detail
         FROM sync_runs WHERE user_id = ?1
         ORDER BY started_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |row| {
        let kind_raw: String = row.get(2)?;
        let status_raw: String = row.get(3)?;
        Ok(RunRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: RunKind::from_str_lossy(&kind_raw),
            status: RunStatus::from_str_lossy(&status_raw),
            items_attempted: row.get::<_, i64>(4)? as u64,
            items_succeeded: row.get::<_, i64>(5)? as u64,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
            detail: row.get(8)?,
        })
    })?;
    rows.collect()
}

/// Aggregate run counts for one user. Older rows may predate the item
/// count columns, so every numeric field is coalesced to zero.
pub fn run_stats(conn: &Connection, user_id: i64) -> Result<RunStats, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'partial' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(COALESCE(items_succeeded, 0)), 0)
         FROM sync_runs WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(RunStats {
                total: row.get::<_, i64>(0)? as u64,
                succeeded: row.get::<_, i64>(1)? as u64,
                partial: row.get::<_, i64>(2)? as u64,
                failed: row.get::<_, i64>(3)? as u64,
                items_synced: row.get::<_, i64>(4)? as u64,
            })
        },
    )
}

/// Bulk delete of one user's history. Confirmation lives at the caller;
/// this is just the primitive.
pub fn clear_runs(conn: &Connection, user_id: i64) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM sync_runs WHERE user_id = ?1", params![user_id])
}
