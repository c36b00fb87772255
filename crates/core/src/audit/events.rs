use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Task lifecycle
    TaskSubmitted {
        task_id: String,
        user_id: String,
        quality_preset: String,
        file_count: usize,
        total_size_bytes: u64,
    },
    TaskStarted {
        task_id: String,
        user_id: String,
    },
    /// Derived task status moved after a file transition.
    TaskStatusChanged {
        task_id: String,
        from_status: String,
        to_status: String,
    },
    TaskCancelled {
        task_id: String,
        cancelled_by: String,
        previous_status: String,
    },
    /// Expired tasks removed by the retention purge.
    TasksPurged {
        count: usize,
    },

    // File lifecycle
    /// A file record changed status.
    FileTransitioned {
        task_id: String,
        file_id: String,
        from_status: String,
        to_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
    /// Verification scored below threshold and a higher preset was requested.
    FileEscalated {
        task_id: String,
        file_id: String,
        from_preset: String,
        to_preset: String,
        score: f64,
    },
    FileCleanedUp {
        task_id: String,
        file_id: String,
        user_id: String,
        action: String,
        object_deleted: bool,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskStatusChanged { .. } => "task_status_changed",
            Self::TaskCancelled { .. } => "task_cancelled",
            Self::TasksPurged { .. } => "tasks_purged",
            Self::FileTransitioned { .. } => "file_transitioned",
            Self::FileEscalated { .. } => "file_escalated",
            Self::FileCleanedUp { .. } => "file_cleaned_up",
        }
    }

    /// Extract task_id if this event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskStatusChanged { task_id, .. }
            | Self::TaskCancelled { task_id, .. }
            | Self::FileTransitioned { task_id, .. }
            | Self::FileEscalated { task_id, .. }
            | Self::FileCleanedUp { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Extract user_id if this event was triggered by a user action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { user_id, .. }
            | Self::TaskStarted { user_id, .. }
            | Self::FileCleanedUp { user_id, .. } => Some(user_id),
            Self::TaskCancelled { cancelled_by, .. } => Some(cancelled_by),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub task_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Unsaved record for `event`; the store assigns `id`.
    pub fn new(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            task_id: event.task_id().map(str::to_string),
            user_id: event.user_id().map(str::to_string),
            data: event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.task_id(), None);
        assert_eq!(event.user_id(), None);
    }

    #[test]
    fn test_event_type_task_submitted() {
        let event = AuditEvent::TaskSubmitted {
            task_id: "task-123".to_string(),
            user_id: "alice".to_string(),
            quality_preset: "balanced+".to_string(),
            file_count: 3,
            total_size_bytes: 3_000,
        };
        assert_eq!(event.event_type(), "task_submitted");
        assert_eq!(event.task_id(), Some("task-123"));
        assert_eq!(event.user_id(), Some("alice"));
    }

    #[test]
    fn test_event_type_task_cancelled() {
        let event = AuditEvent::TaskCancelled {
            task_id: "task-123".to_string(),
            cancelled_by: "bob".to_string(),
            previous_status: "CONVERTING".to_string(),
        };
        assert_eq!(event.event_type(), "task_cancelled");
        assert_eq!(event.user_id(), Some("bob"));
    }

    #[test]
    fn test_system_driven_events_have_no_user() {
        let event = AuditEvent::FileEscalated {
            task_id: "task-1".to_string(),
            file_id: "f1".to_string(),
            from_preset: "balanced".to_string(),
            to_preset: "high".to_string(),
            score: 0.91,
        };
        assert_eq!(event.task_id(), Some("task-1"));
        assert_eq!(event.user_id(), None);

        let event = AuditEvent::TasksPurged { count: 4 };
        assert_eq!(event.task_id(), None);
    }

    #[test]
    fn test_serialized_tag() {
        let event = AuditEvent::FileTransitioned {
            task_id: "task-1".to_string(),
            file_id: "f1".to_string(),
            from_status: "VERIFYING".to_string(),
            to_status: "FAILED".to_string(),
            preset: None,
            error_code: Some("QUALITY_CHECK_FAILED".to_string()),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "file_transitioned");
        assert!(json.get("preset").is_none());

        let parsed: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }
}
