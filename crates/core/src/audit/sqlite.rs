use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{AuditError, AuditFilter, AuditRecord, AuditStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    task_id TEXT,
    user_id TEXT,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_events_task_id ON audit_events(task_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_audit_events_user_id ON audit_events(user_id, timestamp);
"#;

// Fixed-width UTC text sorts chronologically, so range filters compare strings.
fn to_column(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_column(raw: &str) -> Result<DateTime<Utc>, AuditError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| AuditError::Timestamp(raw.to_string()))
}

/// id, timestamp, event_type, task_id, user_id, data
type RawRecord = (i64, String, String, Option<String>, Option<String>, String);

/// Audit trail kept in the same SQLite file as tasks, in its own table.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AuditError> {
        // Task and audit stores share the file; wait out the other writer.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn.lock().map_err(|_| AuditError::Poisoned)
    }

    /// `WHERE` clause and its positional values for `filter`.
    fn conditions(filter: &AuditFilter) -> (String, Vec<Value>) {
        let text = |s: &String| Value::Text(s.clone());
        let clauses = [
            ("task_id = ?", filter.task_id.as_ref().map(text)),
            ("event_type = ?", filter.event_type.as_ref().map(text)),
            ("user_id = ?", filter.user_id.as_ref().map(text)),
            ("timestamp >= ?", filter.from.map(|t| Value::Text(to_column(t)))),
            ("timestamp <= ?", filter.to.map(|t| Value::Text(to_column(t)))),
        ];

        let (sql, values): (Vec<&str>, Vec<Value>) = clauses
            .into_iter()
            .filter_map(|(sql, value)| value.map(|v| (sql, v)))
            .unzip();

        if sql.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", sql.join(" AND ")), values)
        }
    }

    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, records: &[AuditRecord]) -> Result<usize, AuditError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO audit_events (timestamp, event_type, task_id, user_id, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(params![
                    to_column(record.timestamp),
                    record.event_type,
                    record.task_id,
                    record.user_id,
                    serde_json::to_string(&record.data)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.conn()?;
        let (where_clause, mut values) = Self::conditions(filter);
        values.push(Value::Integer(filter.limit));
        values.push(Value::Integer(filter.offset));

        let sql = format!(
            "SELECT id, timestamp, event_type, task_id, user_id, data FROM audit_events {}
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, timestamp, event_type, task_id, user_id, data)| -> Result<_, AuditError> {
                Ok(AuditRecord {
                    id,
                    timestamp: from_column(&timestamp)?,
                    event_type,
                    task_id,
                    user_id,
                    data: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.conn()?;
        let (where_clause, values) = Self::conditions(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);
        Ok(conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?)
    }
}
