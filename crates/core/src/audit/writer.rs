use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditHandle, AuditRecord, AuditStore};
use crate::metrics::AUDIT_EVENTS_DROPPED;

/// Most records written in one store call.
const MAX_BATCH: usize = 64;

/// Drains the audit channel into an [`AuditStore`].
///
/// Records already queued when a batch starts go to the store together, so
/// bursts of file transitions cost one transaction instead of one each.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditRecord>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditRecord>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Run until every [`AuditHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Audit writer started");

        let mut batch = Vec::with_capacity(MAX_BATCH);
        while self.rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
            self.flush(&batch);
            batch.clear();
        }

        tracing::info!("Audit writer stopped");
    }

    fn flush(&self, batch: &[AuditRecord]) {
        match self.store.append(batch) {
            Ok(written) => tracing::trace!("Stored {} audit records", written),
            Err(e) => {
                AUDIT_EVENTS_DROPPED
                    .with_label_values(&["store_error"])
                    .inc_by(batch.len() as u64);
                tracing::error!("Failed to store {} audit records: {}", batch.len(), e);
            }
        }
    }
}

/// Build the audit channel.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into each component. `buffer_size` bounds how many records may wait for
/// the writer; `emit` waits and `try_emit` drops once it is full.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}
