//! Fetch context carrying the event sink, progress sink, and cancellation
//!
//! Passed by reference into every component instead of process-wide state.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Warning;
use crate::progress::ProgressSink;

/// Structured event emitted while a fetch runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    ReleaseResolved {
        owner: String,
        repo: String,
        tag: String,
    },
    ArtifactsSelected { count: usize, fallback: bool },
    DownloadStarted { artifact: String },
    DownloadFinished { artifact: String, path: PathBuf },
    DownloadFailed { artifact: String, error: String },
    Extracted { archive: PathBuf, into: PathBuf },
    Placed { source: PathBuf, target: PathBuf },
    VersionRecorded { tag: String },
    Degraded(Warning),
}

/// Per-operation context
#[derive(Clone, Default)]
pub struct FetchContext {
    events: Option<mpsc::Sender<FetchEvent>>,
    progress: Option<Arc<dyn ProgressSink>>,
    cancel: CancellationToken,
    events_disabled: Arc<AtomicBool>,
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("events", &self.events.is_some())
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl FetchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route structured events into a channel
    pub fn with_events(mut self, tx: mpsc::Sender<FetchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Report transfer progress to a sink
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Tie this context to an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn progress(&self) -> Option<Arc<dyn ProgressSink>> {
        self.progress.clone()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send an event without blocking
    ///
    /// A full channel drops the event. A closed channel disables further
    /// events for this context after logging once.
    pub fn emit(&self, event: FetchEvent) {
        if self.events_disabled.load(Ordering::Relaxed) {
            return;
        }

        if let Some(ref tx) = self.events
            && let Err(e) = tx.try_send(event)
        {
            match e {
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Event channel closed, continuing without fetch events");
                    self.events_disabled.store(true, Ordering::Relaxed);
                }
                mpsc::error::TrySendError::Full(_) => {}
            }
        }
    }

    /// Log a degradation and forward it as an event
    pub fn degrade(&self, warning: Warning) -> Warning {
        warn!("{warning}");
        self.emit(FetchEvent::Degraded(warning.clone()));
        warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let ctx = FetchContext::new().with_events(tx);

        ctx.emit(FetchEvent::VersionRecorded { tag: "v1".into() });

        assert_eq!(
            rx.recv().await,
            Some(FetchEvent::VersionRecorded { tag: "v1".into() })
        );
    }

    #[tokio::test]
    async fn closed_channel_disables_events() {
        let (tx, rx) = mpsc::channel(1);
        let ctx = FetchContext::new().with_events(tx);
        drop(rx);

        ctx.emit(FetchEvent::VersionRecorded { tag: "v1".into() });
        assert!(ctx.events_disabled.load(Ordering::Relaxed));
    }

    #[test]
    fn degrade_returns_the_warning() {
        let ctx = FetchContext::new();
        let warning = Warning::FallbackSelection {
            artifact: "tool.tar.gz".into(),
        };
        assert_eq!(ctx.degrade(warning.clone()), warning);
    }
}
