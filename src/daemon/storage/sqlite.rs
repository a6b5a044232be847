use std::{path::Path, time::Duration as StdDuration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use super::{
    entities::{EnrichedSample, NewSession, SessionClose, SessionId, StoredSession},
    migrations::run_migrations,
    PersistenceSink,
};

pub const DATABASE_FILE_NAME: &str = "activity.db";

/// Fixed width UTC timestamps, so that text comparison in SQL matches chronological order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid {column} '{value}': {e}"))
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("Value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("Column {column} holds negative value {value}"))
}

fn row_to_session(row: &Row) -> Result<StoredSession> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let category: String = row.get("category")?;

    Ok(StoredSession {
        id: SessionId(row.get("id")?),
        app_name: row.get("app_name")?,
        window_title: row.get("window_title")?,
        start_time: parse_timestamp(&start_time, "start_time")?,
        end_time: end_time
            .map(|v| parse_timestamp(&v, "end_time"))
            .transpose()?,
        duration: to_u64(row.get("duration")?, "duration")?,
        category: category.parse()?,
        productivity_score: row.get("productivity_score")?,
        idle_seconds: to_u64(row.get("idle_seconds")?, "idle_seconds")?,
        activity_count: to_u64(row.get("activity_count")?, "activity_count")?,
    })
}

const SESSION_COLUMNS: &str = "id, app_name, window_title, start_time, end_time, duration, \
     category, productivity_score, idle_seconds, activity_count";

/// SQLite backed session store.
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // The tracker and a reporting process may hold the file at the same time.
        conn.busy_timeout(StdDuration::from_secs(5))?;
        run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    fn query_sessions(
        &self,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM app_sessions WHERE {filter} ORDER BY start_time, id"
        );
        let mut statement = self.conn.prepare(&sql)?;
        let mut rows = statement.query(params)?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(row_to_session(row)?);
        }
        Ok(sessions)
    }

    /// Finished sessions that started at or after `since`, oldest first.
    pub fn completed_sessions(&self, since: DateTime<Utc>) -> Result<Vec<StoredSession>> {
        self.query_sessions(
            "start_time >= ?1 AND end_time IS NOT NULL",
            params![format_timestamp(since)],
        )
    }

    /// Sessions that were started but never ended or deleted.
    pub fn open_sessions(&self) -> Result<Vec<StoredSession>> {
        self.query_sessions("end_time IS NULL", [])
    }

    /// Deletes sessions a previous run started but never finished, e.g. because the process was
    /// killed. Their real end is unknown, so they can't be closed honestly.
    pub fn discard_open_sessions(&mut self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM app_sessions WHERE end_time IS NULL", [])?;
        if removed > 0 {
            debug!("Discarded {removed} unfinished sessions");
        }
        Ok(removed)
    }

    pub fn sample_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM enriched_samples", [], |row| row.get(0))?;
        to_u64(count, "count")
    }

    /// Drops sessions and samples older than `days_to_keep` days. Returns the number of removed
    /// rows.
    pub fn cleanup_old_data(&mut self, days_to_keep: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_timestamp(now - Duration::days(days_to_keep as i64));
        let tx = self.conn.transaction()?;
        let samples = tx.execute(
            "DELETE FROM enriched_samples WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let sessions = tx.execute(
            "DELETE FROM app_sessions WHERE start_time < ?1",
            params![cutoff],
        )?;
        tx.commit()?;
        debug!("Removed {sessions} sessions and {samples} samples older than {cutoff}");
        Ok(samples + sessions)
    }
}

impl PersistenceSink for SqliteSessionStore {
    fn start_session(&mut self, session: &NewSession) -> Result<SessionId> {
        self.conn.execute(
            "INSERT INTO app_sessions
                (app_name, window_title, start_time, category, productivity_score)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.app_name.as_ref(),
                session.window_title.as_ref(),
                format_timestamp(session.started_at),
                session.category.as_str(),
                session.productivity_score,
            ],
        )?;
        Ok(SessionId(self.conn.last_insert_rowid()))
    }

    fn end_session(&mut self, id: SessionId, close: &SessionClose) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE app_sessions
             SET end_time = ?1, duration = ?2, idle_seconds = ?3, activity_count = ?4
             WHERE id = ?5",
            params![
                format_timestamp(close.ended_at),
                to_i64(close.duration_seconds)?,
                to_i64(close.idle_seconds)?,
                to_i64(close.activity_count)?,
                id.0,
            ],
        )?;
        if updated == 0 {
            bail!("Session {id} doesn't exist");
        }
        Ok(())
    }

    fn delete_session(&mut self, id: SessionId) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM app_sessions WHERE id = ?1", params![id.0])?;
        if deleted == 0 {
            bail!("Session {id} doesn't exist");
        }
        Ok(())
    }

    fn record_enriched_sample(&mut self, sample: &EnrichedSample) -> Result<()> {
        self.conn.execute(
            "INSERT INTO enriched_samples (timestamp, app_name, window_title, category,
                productivity_score, url, file_path, activity_intensity, is_idle, idle_seconds,
                cpu_percent, memory_percent, process_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                format_timestamp(sample.timestamp),
                sample.app_name.as_ref(),
                sample.window_title.as_ref(),
                sample.category.as_str(),
                sample.productivity_score,
                sample.url,
                sample.file_path,
                sample.activity_intensity,
                sample.is_idle,
                sample.idle_seconds,
                sample.resources.cpu_percent,
                sample.resources.memory_percent,
                to_i64(sample.resources.process_count as u64)?,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;
    use crate::daemon::{collection::classifier::Category, storage::entities::ResourceUsage};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    fn new_session(app: &str, started_at: DateTime<Utc>) -> NewSession {
        NewSession {
            app_name: app.into(),
            window_title: "main.rs - /home/dev/app/src/main.rs".into(),
            started_at,
            category: Category::Development,
            productivity_score: 0.9,
        }
    }

    #[test]
    fn test_session_lifecycle() -> Result<()> {
        let mut store = SqliteSessionStore::open_in_memory()?;
        let id = store.start_session(&new_session("code", start()))?;

        assert_eq!(store.open_sessions()?.len(), 1);
        assert!(store.completed_sessions(start())?.is_empty());

        store.end_session(
            id,
            &SessionClose {
                ended_at: start() + Duration::seconds(95),
                duration_seconds: 95,
                idle_seconds: 10,
                activity_count: 17,
            },
        )?;

        let completed = store.completed_sessions(start())?;
        assert_eq!(completed.len(), 1);
        let session = &completed[0];
        assert_eq!(session.id, id);
        assert_eq!(session.duration, 95);
        assert_eq!(session.span(), Some(Duration::seconds(95)));
        assert_eq!(session.category, Category::Development);
        assert_eq!(session.activity_count, 17);
        assert!(store.open_sessions()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_deleted_session_is_gone() -> Result<()> {
        let mut store = SqliteSessionStore::open_in_memory()?;
        let id = store.start_session(&new_session("firefox", start()))?;
        store.delete_session(id)?;

        assert!(store.open_sessions()?.is_empty());
        assert!(store.completed_sessions(start())?.is_empty());
        assert!(store.delete_session(id).is_err());
        Ok(())
    }

    #[test]
    fn test_unfinished_sessions_are_discarded_on_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(DATABASE_FILE_NAME);
        {
            let mut store = SqliteSessionStore::open(&path)?;
            let finished = store.start_session(&new_session("code", start()))?;
            store.end_session(
                finished,
                &SessionClose {
                    ended_at: start() + Duration::seconds(60),
                    duration_seconds: 60,
                    idle_seconds: 0,
                    activity_count: 11,
                },
            )?;
            store.start_session(&new_session("firefox", start() + Duration::seconds(60)))?;
        }

        let mut store = SqliteSessionStore::open(&path)?;
        assert_eq!(store.open_sessions()?.len(), 1);
        assert_eq!(store.discard_open_sessions()?, 1);

        assert!(store.open_sessions()?.is_empty());
        let completed = store.completed_sessions(start())?;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].app_name, "code");
        assert_eq!(store.discard_open_sessions()?, 0);
        Ok(())
    }

    #[test]
    fn test_ending_unknown_session_fails() -> Result<()> {
        let mut store = SqliteSessionStore::open_in_memory()?;
        let close = SessionClose {
            ended_at: start(),
            duration_seconds: 0,
            idle_seconds: 0,
            activity_count: 0,
        };
        assert!(store.end_session(SessionId(42), &close).is_err());
        Ok(())
    }

    #[test]
    fn test_cleanup_removes_only_old_rows() -> Result<()> {
        let dir = tempdir()?;
        let mut store = SqliteSessionStore::open(&dir.path().join(DATABASE_FILE_NAME))?;
        let now = start() + Duration::days(100);

        store.start_session(&new_session("old", start()))?;
        store.start_session(&new_session("recent", now - Duration::days(1)))?;
        store.record_enriched_sample(&EnrichedSample {
            timestamp: start(),
            app_name: "old".into(),
            window_title: "".into(),
            category: Category::Other,
            productivity_score: 0.5,
            url: None,
            file_path: None,
            activity_intensity: 0.0,
            is_idle: false,
            idle_seconds: 0.0,
            resources: ResourceUsage::default(),
        })?;

        assert_eq!(store.cleanup_old_data(90, now)?, 2);
        let remaining = store.open_sessions()?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].app_name, "recent");
        assert_eq!(store.sample_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_reopening_keeps_data() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(DATABASE_FILE_NAME);
        {
            let mut store = SqliteSessionStore::open(&path)?;
            store.start_session(&new_session("code", start()))?;
        }
        let store = SqliteSessionStore::open(&path)?;
        assert_eq!(store.open_sessions()?.len(), 1);
        Ok(())
    }
}
