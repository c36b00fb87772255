//! Cooperative stop signal for running workflows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Why a workflow was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The task was cancelled; the workflow will never run again.
    Cancelled,
    /// The service is shutting down; the workflow resumes on restart.
    Shutdown,
}

/// Owner side: raises the stop flag for every [`StopSignal`] it handed out.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<Option<StopReason>>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Raise the flag. Only the first reason sticks.
    pub fn stop(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
            _owned: None,
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Workflow side of a [`StopHandle`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<Option<StopReason>>,
    _owned: Option<Arc<watch::Sender<Option<StopReason>>>>,
}

impl StopSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            rx,
            _owned: Some(Arc::new(tx)),
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised. A dropped handle counts as shutdown.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.rx.clone();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(StopReason::Shutdown),
            Err(_) => StopReason::Shutdown,
        };
        reason
    }

    /// Sleep unless stopped first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), StopReason> {
        tokio::select! {
            reason = self.stopped() => Err(reason),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run `fut` unless stopped first. A stopped future is dropped.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, StopReason> {
        tokio::select! {
            reason = self.stopped() => Err(reason),
            output = fut => Ok(output),
        }
    }
}
