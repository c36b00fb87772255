//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{FileRecord, FileStatus, FileTransition, Task, TaskError, TaskFilter, TaskStore};

/// SQLite-backed task store.
///
/// Tasks live in `tasks`; each file record is a JSON document in
/// `task_files` next to an indexed copy of its status.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

/// Raw `tasks` row before decoding.
struct TaskRow {
    task_id: String,
    user_id: String,
    quality_preset: String,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    cancelled_at: Option<String>,
    expires_at: i64,
}

const TASK_COLUMNS: &str = "task_id, user_id, quality_preset, created_at, updated_at, started_at, completed_at, cancelled_at, expires_at";

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        // The audit store writes to the same file from its own connection
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                quality_preset TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                cancelled_at TEXT,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_user_created ON tasks(user_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_tasks_expires_at ON tasks(expires_at);

            CREATE TABLE IF NOT EXISTS task_files (
                task_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                status TEXT NOT NULL,
                record TEXT NOT NULL,
                PRIMARY KEY (task_id, file_id)
            );

            CREATE INDEX IF NOT EXISTS idx_task_files_status ON task_files(status);
            "#,
        )
        .map_err(db_err)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("connection mutex poisoned".to_string()))
    }

    fn load_task(conn: &Connection, task_id: &str, now: DateTime<Utc>) -> Result<Option<Task>, TaskError> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE task_id = ?1 AND expires_at > ?2",
            TASK_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![task_id, now.timestamp()], Self::read_task_row)
            .optional()
            .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT record FROM task_files WHERE task_id = ?1 ORDER BY position ASC")
            .map_err(db_err)?;
        let records = stmt
            .query_map(params![task_id], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut files = Vec::new();
        for record in records {
            let json = record.map_err(db_err)?;
            let file: FileRecord =
                serde_json::from_str(&json).map_err(|e| TaskError::Serialization(e.to_string()))?;
            files.push(file);
        }

        Self::decode_task(row, files).map(Some)
    }

    fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<TaskRow> {
        Ok(TaskRow {
            task_id: row.get(0)?,
            user_id: row.get(1)?,
            quality_preset: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            started_at: row.get(5)?,
            completed_at: row.get(6)?,
            cancelled_at: row.get(7)?,
            expires_at: row.get(8)?,
        })
    }

    fn decode_task(row: TaskRow, files: Vec<FileRecord>) -> Result<Task, TaskError> {
        let quality_preset = row
            .quality_preset
            .parse()
            .map_err(|e: crate::preset::UnknownPreset| TaskError::Serialization(e.to_string()))?;
        let expires_at = Utc
            .timestamp_opt(row.expires_at, 0)
            .single()
            .ok_or_else(|| TaskError::Serialization(format!("Invalid expiry: {}", row.expires_at)))?;

        Ok(Task {
            task_id: row.task_id,
            user_id: row.user_id,
            quality_preset,
            files,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            started_at: row.started_at.as_deref().map(parse_ts).transpose()?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
            cancelled_at: row.cancelled_at.as_deref().map(parse_ts).transpose()?,
            expires_at,
        })
    }

    fn load_existing(conn: &Connection, task_id: &str, now: DateTime<Utc>) -> Result<Task, TaskError> {
        Self::load_task(conn, task_id, now)?.ok_or_else(|| TaskError::NotFound(task_id.to_string()))
    }

    fn load_many(conn: &Connection, ids: Vec<String>, now: DateTime<Utc>) -> Result<Vec<Task>, TaskError> {
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = Self::load_task(conn, &id, now)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn query_ids(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<String>, TaskError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, task: &Task) -> Result<(), TaskError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT task_id FROM tasks WHERE task_id = ?1",
                params![task.task_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if exists.is_some() {
            return Err(TaskError::AlreadyExists(task.task_id.clone()));
        }

        tx.execute(
            "INSERT INTO tasks (task_id, user_id, quality_preset, created_at, updated_at, started_at, completed_at, cancelled_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.task_id,
                task.user_id,
                task.quality_preset.as_str(),
                fmt_ts(task.created_at),
                fmt_ts(task.updated_at),
                task.started_at.map(fmt_ts),
                task.completed_at.map(fmt_ts),
                task.cancelled_at.map(fmt_ts),
                task.expires_at.timestamp(),
            ],
        )
        .map_err(db_err)?;

        for (position, file) in task.files.iter().enumerate() {
            let record =
                serde_json::to_string(file).map_err(|e| TaskError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO task_files (task_id, file_id, position, status, record) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.task_id,
                    file.file_id,
                    position as i64,
                    file.status.as_str(),
                    record
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    fn get(&self, task_id: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.lock()?;
        Self::load_task(&conn, task_id, Utc::now())
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let now_secs = now.timestamp();

        let ids = match filter.user_id {
            Some(ref user_id) => Self::query_ids(
                &conn,
                "SELECT task_id FROM tasks WHERE expires_at > ?1 AND user_id = ?2 ORDER BY created_at DESC",
                &[&now_secs, user_id],
            )?,
            None => Self::query_ids(
                &conn,
                "SELECT task_id FROM tasks WHERE expires_at > ?1 ORDER BY created_at DESC",
                &[&now_secs],
            )?,
        };

        // Status is derived from the files, so it is filtered after loading.
        let tasks = Self::load_many(&conn, ids, now)?
            .into_iter()
            .filter(|task| filter.status.map_or(true, |status| task.status() == status))
            .skip(filter.offset)
            .take(filter.limit)
            .collect();

        Ok(tasks)
    }

    fn update_file(
        &self,
        task_id: &str,
        file_id: &str,
        expected: FileStatus,
        transition: FileTransition,
    ) -> Result<Task, TaskError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let now = write_time();

        let mut task = Self::load_existing(&tx, task_id, now)?;
        // A cancelled task only accepts client dispositions.
        if task.cancelled_at.is_some() && !matches!(transition, FileTransition::Dispose(_)) {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                current_state: "CANCELLED".to_string(),
                operation: transition.name().to_string(),
            });
        }

        let file = task
            .files
            .iter_mut()
            .find(|f| f.file_id == file_id)
            .ok_or_else(|| TaskError::FileNotFound {
                task_id: task_id.to_string(),
                file_id: file_id.to_string(),
            })?;

        if file.status != expected {
            return Err(TaskError::PreconditionFailed {
                task_id: task_id.to_string(),
                file_id: file_id.to_string(),
                expected,
                actual: file.status,
            });
        }

        file.apply(&transition, now)
            .map_err(|e| TaskError::InvalidTransition {
                file_id: file_id.to_string(),
                from: e.from,
                transition: e.transition,
            })?;

        let record =
            serde_json::to_string(&*file).map_err(|e| TaskError::Serialization(e.to_string()))?;
        let updated = tx
            .execute(
                "UPDATE task_files SET status = ?1, record = ?2 WHERE task_id = ?3 AND file_id = ?4 AND status = ?5",
                params![file.status.as_str(), record, task_id, file_id, expected.as_str()],
            )
            .map_err(db_err)?;
        if updated != 1 {
            return Err(TaskError::Database(format!(
                "conditional update of {}/{} touched {} rows",
                task_id, file_id, updated
            )));
        }

        task.updated_at = now;
        if task.completed_at.is_none() && task.status().is_terminal() {
            task.completed_at = Some(now);
        }

        tx.execute(
            "UPDATE tasks SET updated_at = ?1, completed_at = ?2 WHERE task_id = ?3",
            params![fmt_ts(now), task.completed_at.map(fmt_ts), task_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(task)
    }

    fn mark_started(&self, task_id: &str) -> Result<Task, TaskError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let now = write_time();

        let mut task = Self::load_existing(&tx, task_id, now)?;
        if task.started_at.is_some() || task.cancelled_at.is_some() {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                current_state: if task.started_at.is_some() {
                    "started".to_string()
                } else {
                    task.status().to_string()
                },
                operation: "start".to_string(),
            });
        }

        task.started_at = Some(now);
        task.updated_at = now;
        tx.execute(
            "UPDATE tasks SET started_at = ?1, updated_at = ?1 WHERE task_id = ?2",
            params![fmt_ts(now), task_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(task)
    }

    fn mark_cancelled(&self, task_id: &str) -> Result<Task, TaskError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let now = write_time();

        let mut task = Self::load_existing(&tx, task_id, now)?;
        let status = task.status();
        if status.is_terminal() {
            return Err(TaskError::InvalidState {
                task_id: task_id.to_string(),
                current_state: status.to_string(),
                operation: "cancel".to_string(),
            });
        }

        task.cancelled_at = Some(now);
        task.completed_at = Some(now);
        task.updated_at = now;
        tx.execute(
            "UPDATE tasks SET cancelled_at = ?1, completed_at = ?1, updated_at = ?1 WHERE task_id = ?2",
            params![fmt_ts(now), task_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(task)
    }

    fn list_resumable(&self) -> Result<Vec<Task>, TaskError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let now_secs = now.timestamp();

        let ids = Self::query_ids(
            &conn,
            "SELECT task_id FROM tasks WHERE started_at IS NOT NULL AND cancelled_at IS NULL AND completed_at IS NULL AND expires_at > ?1 ORDER BY created_at ASC",
            &[&now_secs],
        )?;

        Ok(Self::load_many(&conn, ids, now)?
            .into_iter()
            .filter(|task| !task.status().is_terminal())
            .collect())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, TaskError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;
        let now_secs = now.timestamp();

        tx.execute(
            "DELETE FROM task_files WHERE task_id IN (SELECT task_id FROM tasks WHERE expires_at <= ?1)",
            params![now_secs],
        )
        .map_err(db_err)?;
        let purged = tx
            .execute("DELETE FROM tasks WHERE expires_at <= ?1", params![now_secs])
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        Ok(purged)
    }
}

fn db_err(e: rusqlite::Error) -> TaskError {
    TaskError::Database(e.to_string())
}

/// Current time at the precision timestamps are stored with, so a returned
/// snapshot equals what a later read sees.
fn write_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed-width timestamps so text ordering matches time ordering.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, TaskError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TaskError::Serialization(format!("Invalid timestamp {}: {}", s, e)))
}
