use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("audit payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("stored timestamp {0:?} is not RFC 3339")]
    Timestamp(String),

    #[error("audit connection lock poisoned")]
    Poisoned,
}

/// Largest page a single audit query returns.
pub const MAX_AUDIT_LIMIT: i64 = 1000;

const DEFAULT_AUDIT_LIMIT: i64 = 100;

/// Which records an audit query selects, newest first.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub task_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            task_id: None,
            event_type: None,
            user_id: None,
            from: None,
            to: None,
            limit: DEFAULT_AUDIT_LIMIT,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_id(self, task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..self
        }
    }

    pub fn with_event_type(self, event_type: impl Into<String>) -> Self {
        Self {
            event_type: Some(event_type.into()),
            ..self
        }
    }

    pub fn with_user_id(self, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..self
        }
    }

    /// Inclusive on both ends; `None` leaves that side open.
    pub fn with_time_range(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to, ..self }
    }

    /// Clamped to `1..=MAX_AUDIT_LIMIT`.
    pub fn with_limit(self, limit: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_AUDIT_LIMIT),
            ..self
        }
    }

    pub fn with_offset(self, offset: i64) -> Self {
        Self {
            offset: offset.max(0),
            ..self
        }
    }

    /// Whether `record` passes every condition, ignoring paging.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        fn same(wanted: &Option<String>, actual: Option<&str>) -> bool {
            wanted.as_deref().map_or(true, |w| actual == Some(w))
        }

        same(&self.task_id, record.task_id.as_deref())
            && same(&self.user_id, record.user_id.as_deref())
            && same(&self.event_type, Some(record.event_type.as_str()))
            && self.from.map_or(true, |from| record.timestamp >= from)
            && self.to.map_or(true, |to| record.timestamp <= to)
    }
}

/// Persistent, append-only audit storage.
pub trait AuditStore: Send + Sync {
    /// Store `records` in order as one unit; returns how many were written.
    fn append(&self, records: &[AuditRecord]) -> Result<usize, AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Number of records `filter` selects before paging.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}
