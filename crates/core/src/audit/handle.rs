use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{AuditEvent, AuditRecord};
use crate::metrics::AUDIT_EVENTS_DROPPED;

/// Sending side of the audit channel.
///
/// Records are stamped when emitted, not when the writer stores them.
/// Cloned into every component that records events; the
/// [`AuditWriter`](super::AuditWriter) finishes once every clone is gone.
#[derive(Debug, Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditRecord>) -> Self {
        Self { tx }
    }

    /// Queue an event, waiting for channel capacity.
    pub async fn emit(&self, event: AuditEvent) {
        let record = AuditRecord::new(Utc::now(), event);
        if let Err(e) = self.tx.send(record).await {
            AUDIT_EVENTS_DROPPED
                .with_label_values(&["channel_closed"])
                .inc();
            tracing::error!(
                "Audit writer is gone, dropping {} event",
                e.0.event_type
            );
        }
    }

    /// Queue an event without waiting, for callers that cannot await.
    ///
    /// Returns false if the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        let record = AuditRecord::new(Utc::now(), event);
        let (reason, record) = match self.tx.try_send(record) {
            Ok(()) => return true,
            Err(TrySendError::Full(record)) => ("channel_full", record),
            Err(TrySendError::Closed(record)) => ("channel_closed", record),
        };
        AUDIT_EVENTS_DROPPED.with_label_values(&[reason]).inc();
        tracing::warn!(
            "Dropping {} event for task {:?}: {}",
            record.event_type,
            record.task_id,
            reason
        );
        false
    }
}
