//! SQLite-backed moderation queue. One pending row per (content_type, content_id),
//! enforced by a partial unique index.

use super::{FlagStats, ModerationQueue, ModerationQueueEntry, NewFlag, QueueStatus, TypeStats, UpsertOutcome};
use crate::actions::ContentType;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS moderation_queue (
        id TEXT PRIMARY KEY,
        content_type TEXT NOT NULL,
        content_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        auto_flagged INTEGER NOT NULL DEFAULT 0,
        confidence_score REAL NOT NULL,
        report_count INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        reviewed_at INTEGER
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_pending_content
        ON moderation_queue(content_type, content_id) WHERE status = 'pending';
    CREATE INDEX IF NOT EXISTS idx_queue_created ON moderation_queue(created_at);
    CREATE TABLE IF NOT EXISTS flag_events (
        event_id TEXT PRIMARY KEY,
        queue_id TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
"#;

const UPSERT: &str = r#"
    INSERT INTO moderation_queue (
        id, content_type, content_id, reason, priority, status,
        auto_flagged, confidence_score, report_count, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 1, ?6, 1, ?7)
    ON CONFLICT (content_type, content_id) WHERE status = 'pending'
    DO UPDATE SET
        priority = MAX(moderation_queue.priority, excluded.priority),
        confidence_score = MAX(moderation_queue.confidence_score, excluded.confidence_score),
        report_count = moderation_queue.report_count + 1
    RETURNING id, report_count
"#;

const SELECT_ENTRY: &str = "SELECT id, content_type, content_id, reason, priority, status, auto_flagged, \
     confidence_score, report_count, created_at, reviewed_at FROM moderation_queue";

#[derive(Clone)]
pub struct SqliteModerationQueue {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteModerationQueue {
    /// Open or create the queue database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| EngineError::Queue("queue connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| EngineError::Queue(format!("queue task failed: {e}")))?
    }
}

fn parse_uuid(raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn unknown(column: &str, value: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, format!("{column}={value}"), rusqlite::types::Type::Text)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<ModerationQueueEntry> {
    let content_type: String = row.get(1)?;
    let status: String = row.get(5)?;
    let priority: i64 = row.get(4)?;
    let report_count: i64 = row.get(8)?;
    let reviewed_at: Option<i64> = row.get(10)?;
    Ok(ModerationQueueEntry {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        content_type: ContentType::parse(&content_type).ok_or_else(|| unknown("content_type", content_type.clone()))?,
        content_id: parse_uuid(&row.get::<_, String>(2)?)?,
        reason: row.get(3)?,
        priority: priority.clamp(0, 100) as u8,
        status: QueueStatus::parse(&status).ok_or_else(|| unknown("status", status.clone()))?,
        auto_flagged: row.get(6)?,
        confidence_score: row.get(7)?,
        report_count: report_count.max(0) as u32,
        created_at: from_millis(row.get(9)?),
        reviewed_at: reviewed_at.map(from_millis),
    })
}

#[async_trait]
impl ModerationQueue for SqliteModerationQueue {
    async fn upsert(&self, flag: &NewFlag) -> Result<UpsertOutcome> {
        let flag = flag.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let event_id = flag.event_id.to_string();

            let seen: Option<String> = tx
                .query_row(
                    "SELECT queue_id FROM flag_events WHERE event_id = ?1",
                    params![event_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(queue_id) = seen {
                return Ok(UpsertOutcome::Duplicate(parse_uuid(&queue_id)?));
            }

            let created_at = flag.created_at.timestamp_millis();
            let (id, report_count): (String, i64) = tx.query_row(
                UPSERT,
                params![
                    Uuid::new_v4().to_string(),
                    flag.content_type.as_str(),
                    flag.content_id.to_string(),
                    flag.reason,
                    flag.priority as i64,
                    flag.confidence_score,
                    created_at,
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.execute(
                "INSERT INTO flag_events (event_id, queue_id, created_at) VALUES (?1, ?2, ?3)",
                params![event_id, id, created_at],
            )?;
            tx.commit()?;

            let id = parse_uuid(&id)?;
            Ok(if report_count <= 1 {
                UpsertOutcome::Inserted(id)
            } else {
                UpsertOutcome::Merged(id)
            })
        })
        .await
    }

    async fn review(&self, id: Uuid, status: QueueStatus) -> Result<bool> {
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE moderation_queue SET status = ?1, reviewed_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().timestamp_millis(), id.to_string()],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<ModerationQueueEntry>> {
        self.with_conn(move |conn| {
            let sql = format!("{SELECT_ENTRY} WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id.to_string()], entry_from_row)
                .optional()?)
        })
        .await
    }

    async fn pending(&self, limit: usize) -> Result<Vec<ModerationQueueEntry>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "{SELECT_ENTRY} WHERE status = 'pending' ORDER BY priority DESC, created_at ASC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64], entry_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn auto_flag_stats(&self, since: DateTime<Utc>) -> Result<FlagStats> {
        let since = since.timestamp_millis();
        self.with_conn(move |conn| {
            let mut stats = FlagStats::default();

            let mut stmt = conn.prepare(
                "SELECT content_type, COUNT(*), AVG(confidence_score), AVG(priority)
                 FROM moderation_queue
                 WHERE auto_flagged = 1 AND created_at >= ?1
                 GROUP BY content_type",
            )?;
            let mut rows = stmt.query(params![since])?;
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                let Some(content_type) = ContentType::parse(&raw) else {
                    tracing::warn!(content_type = %raw, "unknown content type in moderation queue");
                    continue;
                };
                let count: i64 = row.get(1)?;
                stats.by_type.insert(
                    content_type,
                    TypeStats {
                        count: count.max(0) as u64,
                        avg_confidence: row.get(2)?,
                        avg_priority: row.get(3)?,
                    },
                );
            }

            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*)
                 FROM moderation_queue
                 WHERE auto_flagged = 1 AND created_at >= ?1
                 GROUP BY status",
            )?;
            let mut rows = stmt.query(params![since])?;
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                if let Some(status) = QueueStatus::parse(&raw) {
                    stats.by_status.insert(status, count.max(0) as u64);
                }
            }
            Ok(stats)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn flag(content_id: Uuid, priority: u8, confidence: f64) -> NewFlag {
        NewFlag {
            event_id: Uuid::new_v4(),
            content_type: ContentType::User,
            content_id,
            reason: "High voting velocity".into(),
            priority,
            confidence_score: confidence,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_then_merge_keeps_max() {
        let q = SqliteModerationQueue::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        let first = q.upsert(&flag(user, 70, 0.8)).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        let second = q.upsert(&flag(user, 60, 0.9)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Merged(first.queue_id()));

        let row = q.get(first.queue_id()).await.unwrap().unwrap();
        assert_eq!(row.report_count, 2);
        assert_eq!(row.priority, 70);
        assert!((row.confidence_score - 0.9).abs() < 1e-12);
        assert_eq!(row.status, QueueStatus::Pending);
        assert!(row.auto_flagged);
    }

    #[tokio::test]
    async fn same_event_is_not_counted_twice() {
        let q = SqliteModerationQueue::open_in_memory().unwrap();
        let f = flag(Uuid::new_v4(), 80, 0.8);
        let first = q.upsert(&f).await.unwrap();
        let again = q.upsert(&f).await.unwrap();
        assert_eq!(again, UpsertOutcome::Duplicate(first.queue_id()));
        assert_eq!(q.get(first.queue_id()).await.unwrap().unwrap().report_count, 1);
    }

    #[tokio::test]
    async fn reviewed_row_allows_new_pending_row() {
        let q = SqliteModerationQueue::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let first = q.upsert(&flag(user, 80, 0.8)).await.unwrap();
        assert!(q.review(first.queue_id(), QueueStatus::Rejected).await.unwrap());

        let second = q.upsert(&flag(user, 80, 0.8)).await.unwrap();
        assert!(matches!(second, UpsertOutcome::Inserted(_)));
        assert_ne!(second.queue_id(), first.queue_id());
        assert_eq!(q.pending(10).await.unwrap().len(), 1);
        assert!(!q.review(Uuid::new_v4(), QueueStatus::Approved).await.unwrap());
    }

    #[tokio::test]
    async fn stats_group_by_type_and_status() {
        let q = SqliteModerationQueue::open_in_memory().unwrap();
        let a = q.upsert(&flag(Uuid::new_v4(), 60, 0.6)).await.unwrap();
        q.upsert(&flag(Uuid::new_v4(), 80, 1.0)).await.unwrap();
        let mut sub = flag(Uuid::new_v4(), 90, 0.8);
        sub.content_type = ContentType::Submission;
        q.upsert(&sub).await.unwrap();
        q.review(a.queue_id(), QueueStatus::Approved).await.unwrap();

        let stats = q.auto_flag_stats(Utc::now() - Duration::hours(1)).await.unwrap();
        let users = &stats.by_type[&ContentType::User];
        assert_eq!(users.count, 2);
        assert!((users.avg_priority - 70.0).abs() < 1e-9);
        assert!((users.avg_confidence - 0.8).abs() < 1e-9);
        assert_eq!(stats.by_type[&ContentType::Submission].count, 1);
        assert_eq!(stats.status_count(QueueStatus::Approved), 1);
        assert_eq!(stats.status_count(QueueStatus::Pending), 2);
        assert_eq!(stats.total(), 3);

        let later = q.auto_flag_stats(Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(later.total(), 0);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let id = {
            let q = SqliteModerationQueue::open(&path).unwrap();
            q.upsert(&flag(Uuid::new_v4(), 75, 0.7)).await.unwrap().queue_id()
        };
        let q = SqliteModerationQueue::open(&path).unwrap();
        assert_eq!(q.get(id).await.unwrap().unwrap().priority, 75);
    }
}
