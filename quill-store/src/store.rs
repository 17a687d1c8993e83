//! SQLite-backed state store: question dedup, DLQ, checkpoints, overflow, catch-up.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

/// Dedup record for an answered question. Keyed by `question_hash`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionState {
    pub question_hash: String,
    pub document_id: String,
    pub normalized_question: String,
    /// Milliseconds since Unix epoch.
    pub processed_at_ms: i64,
    pub answered: bool,
    pub comment_id: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: i64,
}

/// A task whose retries are exhausted. Terminal; drained only by manual retry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: i64,
    pub task_id: String,
    pub kind: String,
    pub document_id: String,
    pub failure_reason: String,
    pub attempt_count: i64,
    pub first_failure_ms: i64,
    pub last_failure_ms: i64,
    pub error_details: String,
    /// Last checkpoint JSON, so a manual retry can resume mid-task.
    pub checkpoint: Option<serde_json::Value>,
}

/// A webhook event spilled to disk because the in-memory queue was full.
#[derive(Clone, Debug)]
pub struct OverflowEvent {
    pub id: i64,
    pub payload: String,
    pub received_at_ms: i64,
}

/// How a failed webhook event should be reprocessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReprocessStrategy {
    Immediate,
    Delayed,
    Manual,
    Skip,
}

impl ReprocessStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReprocessStrategy::Immediate => "immediate",
            ReprocessStrategy::Delayed => "delayed",
            ReprocessStrategy::Manual => "manual",
            ReprocessStrategy::Skip => "skip",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "immediate" => ReprocessStrategy::Immediate,
            "manual" => ReprocessStrategy::Manual,
            "skip" => ReprocessStrategy::Skip,
            _ => ReprocessStrategy::Delayed,
        }
    }
}

/// A webhook event recorded for timed reprocessing.
#[derive(Clone, Debug)]
pub struct FailedEvent {
    pub id: i64,
    pub payload: String,
    pub error: String,
    pub attempt_count: i64,
    pub next_retry_ms: i64,
    pub strategy: ReprocessStrategy,
}

/// Audit status of a detected command. Never load-bearing; truth lives in
/// document markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Processing => "processing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }
}

/// Singleton row (id=1) recording the last completed catch-up scan.
#[derive(Clone, Debug, Default)]
pub struct CatchupState {
    pub last_processed_time_ms: i64,
    pub last_document_id: Option<String>,
    pub documents_processed: i64,
    pub duration_ms: i64,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed store. One connection behind a mutex: single writer, which is
/// what the embedded file supports anyway.
pub struct Store {
    db: Arc<Mutex<rusqlite::Connection>>,
    path: PathBuf,
}

impl Store {
    /// Opens or creates the database and all tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS question_state (
                question_hash TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                normalized_question TEXT NOT NULL,
                processed_at INTEGER NOT NULL,
                answered INTEGER NOT NULL DEFAULT 0,
                comment_id TEXT,
                last_error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS command_log (
                command_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                args TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_attempt INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );
            CREATE TABLE IF NOT EXISTS dead_letter_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                document_id TEXT NOT NULL,
                failure_reason TEXT NOT NULL,
                attempt_count INTEGER NOT NULL,
                first_failure INTEGER NOT NULL,
                last_failure INTEGER NOT NULL,
                error_details TEXT NOT NULL DEFAULT '',
                checkpoint TEXT
            );
            CREATE TABLE IF NOT EXISTS task_checkpoints (
                task_id TEXT PRIMARY KEY,
                steps TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS overflow_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                received_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS failed_webhook_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL,
                error TEXT NOT NULL DEFAULT '',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                next_retry INTEGER NOT NULL DEFAULT 0,
                strategy TEXT NOT NULL DEFAULT 'delayed'
            );
            CREATE TABLE IF NOT EXISTS catchup_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_processed_time INTEGER NOT NULL,
                last_document_id TEXT,
                documents_processed INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_question_state_processed_at
                ON question_state(processed_at);
            CREATE INDEX IF NOT EXISTS idx_failed_events_next_retry
                ON failed_webhook_events(next_retry);
            "#,
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            f(&conn)
        })
    }

    fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut rusqlite::Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let mut conn = db.lock().map_err(|_| StoreError::Storage("lock".into()))?;
            f(&mut conn)
        })
    }

    /// Cheap readiness probe: one row round-trip.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    // --- question_state ---

    pub async fn get_question(&self, hash: &str) -> Result<Option<QuestionState>, StoreError> {
        let hash = hash.to_string();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT question_hash, document_id, normalized_question, processed_at,
                        answered, comment_id, last_error, retry_count
                 FROM question_state WHERE question_hash = ?1",
            )?;
            let row = stmt
                .query_row(rusqlite::params![hash], |row| {
                    Ok(QuestionState {
                        question_hash: row.get(0)?,
                        document_id: row.get(1)?,
                        normalized_question: row.get(2)?,
                        processed_at_ms: row.get(3)?,
                        answered: row.get::<_, i64>(4)? != 0,
                        comment_id: row.get(5)?,
                        last_error: row.get(6)?,
                        retry_count: row.get(7)?,
                    })
                })
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::from(other)),
                })?;
            Ok(row)
        })
    }

    pub async fn upsert_question(&self, state: &QuestionState) -> Result<(), StoreError> {
        let s = state.clone();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO question_state
                     (question_hash, document_id, normalized_question, processed_at,
                      answered, comment_id, last_error, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(question_hash) DO UPDATE SET
                     processed_at = excluded.processed_at,
                     answered = excluded.answered,
                     comment_id = excluded.comment_id,
                     last_error = excluded.last_error,
                     retry_count = excluded.retry_count",
                rusqlite::params![
                    s.question_hash,
                    s.document_id,
                    s.normalized_question,
                    s.processed_at_ms,
                    s.answered as i64,
                    s.comment_id,
                    s.last_error,
                    s.retry_count,
                ],
            )?;
            Ok(())
        })
    }

    /// Deletes question rows processed before `cutoff_ms`. Returns rows removed.
    pub async fn sweep_questions(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM question_state WHERE processed_at < ?1",
                rusqlite::params![cutoff_ms],
            )?;
            Ok(n)
        })
    }

    // --- command_log (audit only) ---

    pub async fn log_command(
        &self,
        command_id: &str,
        document_id: &str,
        kind: &str,
        args: &str,
        status: CommandStatus,
    ) -> Result<(), StoreError> {
        let (command_id, document_id, kind, args) = (
            command_id.to_string(),
            document_id.to_string(),
            kind.to_string(),
            args.to_string(),
        );
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO command_log
                     (command_id, document_id, kind, args, status, attempt_count, last_attempt)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                 ON CONFLICT(command_id) DO UPDATE SET
                     status = excluded.status,
                     attempt_count = command_log.attempt_count + 1,
                     last_attempt = excluded.last_attempt",
                rusqlite::params![command_id, document_id, kind, args, status.as_str(), now_ms()],
            )?;
            Ok(())
        })
    }

    pub async fn finish_command(
        &self,
        command_id: &str,
        status: CommandStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let command_id = command_id.to_string();
        let error = error.map(String::from);
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE command_log SET status = ?2, last_error = ?3, last_attempt = ?4
                 WHERE command_id = ?1",
                rusqlite::params![command_id, status.as_str(), error, now_ms()],
            )?;
            Ok(())
        })
    }

    // --- task_checkpoints ---

    pub async fn put_checkpoint(
        &self,
        task_id: &str,
        steps: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let task_id = task_id.to_string();
        let steps = serde_json::to_string(steps)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO task_checkpoints (task_id, steps, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(task_id) DO UPDATE SET
                     steps = excluded.steps, updated_at = excluded.updated_at",
                rusqlite::params![task_id, steps, now_ms()],
            )?;
            Ok(())
        })
    }

    pub async fn get_checkpoint(
        &self,
        task_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT steps FROM task_checkpoints WHERE task_id = ?1",
                    rusqlite::params![task_id],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(StoreError::from(other)),
                })?;
            match raw {
                Some(s) => serde_json::from_str(&s)
                    .map(Some)
                    .map_err(|e| StoreError::Storage(e.to_string())),
                None => Ok(None),
            }
        })
    }

    pub async fn delete_checkpoint(&self, task_id: &str) -> Result<(), StoreError> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM task_checkpoints WHERE task_id = ?1",
                rusqlite::params![task_id],
            )?;
            Ok(())
        })
    }

    /// Deletes checkpoints not updated since `cutoff_ms` (orphans with no live task).
    pub async fn sweep_checkpoints(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM task_checkpoints WHERE updated_at < ?1",
                rusqlite::params![cutoff_ms],
            )?;
            Ok(n)
        })
    }

    // --- dead_letter_queue ---

    /// Inserts a DLQ entry (the `id` field of `entry` is ignored). Returns the row id.
    pub async fn push_dlq(&self, entry: &DlqEntry) -> Result<i64, StoreError> {
        let e = entry.clone();
        let checkpoint = match &e.checkpoint {
            Some(v) => Some(
                serde_json::to_string(v).map_err(|err| StoreError::Storage(err.to_string()))?,
            ),
            None => None,
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO dead_letter_queue
                     (task_id, kind, document_id, failure_reason, attempt_count,
                      first_failure, last_failure, error_details, checkpoint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    e.task_id,
                    e.kind,
                    e.document_id,
                    e.failure_reason,
                    e.attempt_count,
                    e.first_failure_ms,
                    e.last_failure_ms,
                    e.error_details,
                    checkpoint,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub async fn list_dlq(&self, limit: usize) -> Result<Vec<DlqEntry>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, kind, document_id, failure_reason, attempt_count,
                        first_failure, last_failure, error_details, checkpoint
                 FROM dead_letter_queue ORDER BY id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_dlq)?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)
        })
    }

    /// Removes and returns one DLQ entry in a single transaction, for manual retry.
    pub async fn take_dlq(&self, id: i64) -> Result<DlqEntry, StoreError> {
        self.with_conn_mut(move |conn| {
            let tx = conn.transaction()?;
            let entry = tx
                .query_row(
                    "SELECT id, task_id, kind, document_id, failure_reason, attempt_count,
                            first_failure, last_failure, error_details, checkpoint
                     FROM dead_letter_queue WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_dlq,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("dlq entry {id}"))
                    }
                    other => StoreError::from(other),
                })?;
            tx.execute(
                "DELETE FROM dead_letter_queue WHERE id = ?1",
                rusqlite::params![id],
            )?;
            tx.commit()?;
            Ok(entry)
        })
    }

    pub async fn delete_dlq(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM dead_letter_queue WHERE id = ?1",
                rusqlite::params![id],
            )?;
            Ok(())
        })
    }

    // --- overflow_events ---

    pub async fn push_overflow(&self, payload: &str) -> Result<i64, StoreError> {
        let payload = payload.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO overflow_events (payload, received_at) VALUES (?1, ?2)",
                rusqlite::params![payload, now_ms()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Oldest-first batch of spilled events for the drain task.
    pub async fn next_overflow_batch(
        &self,
        limit: usize,
    ) -> Result<Vec<OverflowEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload, received_at FROM overflow_events
                 ORDER BY id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
                Ok(OverflowEvent {
                    id: row.get(0)?,
                    payload: row.get(1)?,
                    received_at_ms: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)
        })
    }

    pub async fn delete_overflow(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM overflow_events WHERE id = ?1",
                rusqlite::params![id],
            )?;
            Ok(())
        })
    }

    pub async fn overflow_depth(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM overflow_events", [], |row| row.get(0))?;
            Ok(n)
        })
    }

    // --- failed_webhook_events ---

    pub async fn record_failed_event(
        &self,
        payload: &str,
        error: &str,
        strategy: ReprocessStrategy,
        next_retry_ms: i64,
        attempt_count: i64,
    ) -> Result<i64, StoreError> {
        let (payload, error) = (payload.to_string(), error.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO failed_webhook_events
                     (payload, error, attempt_count, next_retry, strategy)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![payload, error, attempt_count, next_retry_ms, strategy.as_str()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Events whose `next_retry` has passed, excluding `manual` and `skip` rows.
    pub async fn due_failed_events(
        &self,
        now_ms: i64,
        limit: usize,
    ) -> Result<Vec<FailedEvent>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, payload, error, attempt_count, next_retry, strategy
                 FROM failed_webhook_events
                 WHERE next_retry <= ?1 AND strategy IN ('immediate', 'delayed')
                 ORDER BY next_retry ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(rusqlite::params![now_ms, limit as i64], |row| {
                let strategy: String = row.get(5)?;
                Ok(FailedEvent {
                    id: row.get(0)?,
                    payload: row.get(1)?,
                    error: row.get(2)?,
                    attempt_count: row.get(3)?,
                    next_retry_ms: row.get(4)?,
                    strategy: ReprocessStrategy::parse(&strategy),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)
        })
    }

    pub async fn resolve_failed_event(&self, id: i64) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM failed_webhook_events WHERE id = ?1",
                rusqlite::params![id],
            )?;
            Ok(())
        })
    }

    /// Re-schedules a failed event (bumps attempt count, moves next_retry, may
    /// change strategy, e.g. to `manual` after exhaustion).
    pub async fn defer_failed_event(
        &self,
        id: i64,
        strategy: ReprocessStrategy,
        next_retry_ms: i64,
        error: &str,
    ) -> Result<(), StoreError> {
        let error = error.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE failed_webhook_events
                 SET attempt_count = attempt_count + 1, next_retry = ?2,
                     strategy = ?3, error = ?4
                 WHERE id = ?1",
                rusqlite::params![id, next_retry_ms, strategy.as_str(), error],
            )?;
            Ok(())
        })
    }

    // --- catchup_state ---

    pub async fn catchup_state(&self) -> Result<Option<CatchupState>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_processed_time, last_document_id, documents_processed, duration_ms
                 FROM catchup_state WHERE id = 1",
                [],
                |row| {
                    Ok(CatchupState {
                        last_processed_time_ms: row.get(0)?,
                        last_document_id: row.get(1)?,
                        documents_processed: row.get(2)?,
                        duration_ms: row.get(3)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::from(other)),
            })
        })
    }

    pub async fn save_catchup_state(&self, state: &CatchupState) -> Result<(), StoreError> {
        let s = state.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO catchup_state
                     (id, last_processed_time, last_document_id, documents_processed, duration_ms)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     last_processed_time = excluded.last_processed_time,
                     last_document_id = excluded.last_document_id,
                     documents_processed = excluded.documents_processed,
                     duration_ms = excluded.duration_ms",
                rusqlite::params![
                    s.last_processed_time_ms,
                    s.last_document_id,
                    s.documents_processed,
                    s.duration_ms,
                ],
            )?;
            Ok(())
        })
    }

    // --- backup ---

    /// Snapshot the database into `dir` via `VACUUM INTO`, keeping the newest
    /// `retain` copies. Returns the new snapshot path.
    pub async fn backup_to(&self, dir: &Path, retain: usize) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Storage(e.to_string()))?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
        let name = format!("quill-{stamp}.db");
        let dest = dir.join(&name);
        let dest_str = dest
            .to_str()
            .ok_or_else(|| StoreError::Storage("non-utf8 backup path".into()))?
            .to_string();
        self.with_conn(move |conn| {
            conn.execute("VACUUM INTO ?1", rusqlite::params![dest_str])?;
            Ok(())
        })?;
        prune_backups(dir, retain)?;
        Ok(dest)
    }

    /// Path of the live database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn row_to_dlq(row: &rusqlite::Row<'_>) -> Result<DlqEntry, rusqlite::Error> {
    let checkpoint: Option<String> = row.get(9)?;
    Ok(DlqEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        kind: row.get(2)?,
        document_id: row.get(3)?,
        failure_reason: row.get(4)?,
        attempt_count: row.get(5)?,
        first_failure_ms: row.get(6)?,
        last_failure_ms: row.get(7)?,
        error_details: row.get(8)?,
        checkpoint: checkpoint.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

fn prune_backups(dir: &Path, retain: usize) -> Result<(), StoreError> {
    let mut snapshots: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| StoreError::Storage(e.to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("quill-") && n.ends_with(".db"))
                .unwrap_or(false)
        })
        .collect();
    snapshots.sort();
    if snapshots.len() > retain {
        let excess = snapshots.len() - retain;
        for old in snapshots.into_iter().take(excess) {
            if let Err(e) = std::fs::remove_file(&old) {
                tracing::warn!("failed to prune backup {}: {}", old.display(), e);
            }
        }
    }
    Ok(())
}
