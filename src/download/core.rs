//! Bounded parallel download orchestration
//!
//! Every work item is spawned at once and waits for a semaphore permit. A
//! single deadline covers the whole batch: when it expires, a shared
//! cancellation token stops admission of items still waiting for a permit
//! and tells in-flight transfers to abort at their next chunk. Outcomes are
//! drained from a completion channel, so output order is completion order.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::transfer::transfer;
use crate::context::{FetchContext, FetchEvent};
use crate::error::{FetchError, Result};
use crate::release::Artifact;

/// Terminal result of one download task
#[derive(Debug)]
pub struct DownloadOutcome {
    pub artifact: String,
    pub result: Result<PathBuf>,
}

/// Artifact that failed inside a batch that partly succeeded
#[derive(Debug)]
pub struct DownloadFailure {
    pub artifact: String,
    pub error: FetchError,
}

/// Successful paths (completion order) plus the failures that were tolerated
#[derive(Debug, Default)]
pub struct BatchReport {
    pub paths: Vec<PathBuf>,
    pub failures: Vec<DownloadFailure>,
}

/// Parameters for one artifact batch
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub timeout: Duration,
    pub buffer_size: usize,
    /// Directory receiving `<artifact name>` files
    pub dest_dir: PathBuf,
}

/// Run `job` for every item with at most `concurrency` in flight
///
/// `cancel` is the parent token; the batch works on a child of it so the
/// deadline never cancels the caller. Items that observe cancellation report
/// `Timeout` if the deadline fired and `Cancelled` otherwise.
pub async fn run_bounded<T, F, Fut>(
    items: Vec<(String, T)>,
    concurrency: usize,
    timeout: Duration,
    cancel: &CancellationToken,
    job: F,
) -> Vec<DownloadOutcome>
where
    T: Send + 'static,
    F: Fn(T, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PathBuf>> + Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let token = cancel.child_token();
    let deadline_hit = Arc::new(AtomicBool::new(false));
    let watchdog = {
        let token = token.clone();
        let deadline_hit = deadline_hit.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            deadline_hit.store(true, Ordering::SeqCst);
            token.cancel();
        })
    };

    let gate = Arc::new(Semaphore::new(concurrency.max(1)));
    let job = Arc::new(job);
    let (tx, mut rx) = mpsc::channel::<DownloadOutcome>(total);

    for (label, item) in items {
        let gate = gate.clone();
        let job = job.clone();
        let token = token.clone();
        let deadline_hit = deadline_hit.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let interrupted = || {
                if deadline_hit.load(Ordering::SeqCst) {
                    FetchError::Timeout(timeout)
                } else {
                    FetchError::Cancelled
                }
            };

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(interrupted()),
                permit = gate.acquire_owned() => match permit {
                    Ok(_permit) if token.is_cancelled() => Err(interrupted()),
                    Ok(_permit) => match job(item, token.clone()).await {
                        Err(FetchError::Cancelled) => Err(interrupted()),
                        other => other,
                    },
                    Err(_) => Err(FetchError::Cancelled),
                },
            };

            // Receiver outlives every sender; a failed send only means the
            // collector was dropped with the caller.
            let _ = tx
                .send(DownloadOutcome {
                    artifact: label,
                    result,
                })
                .await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(total);
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    watchdog.abort();
    outcomes
}

/// Split outcomes into a report, failing only when nothing succeeded
pub fn collect_outcomes(outcomes: Vec<DownloadOutcome>) -> Result<BatchReport> {
    let total = outcomes.len();
    let mut report = BatchReport::default();

    for outcome in outcomes {
        match outcome.result {
            Ok(path) => report.paths.push(path),
            Err(error) => report.failures.push(DownloadFailure {
                artifact: outcome.artifact,
                error,
            }),
        }
    }

    if total > 0 && report.paths.is_empty() {
        error!("All {total} artifact downloads failed");
        let first = report.failures.remove(0);
        return Err(FetchError::AllDownloadsFailed {
            total,
            first: Box::new(first.error),
        });
    }

    if !report.failures.is_empty() {
        warn!(
            "{} of {total} artifact downloads failed, continuing with {}",
            report.failures.len(),
            report.paths.len()
        );
    }

    Ok(report)
}

/// Download every artifact into `options.dest_dir`
pub async fn download_all(
    ctx: &FetchContext,
    client: &reqwest::Client,
    artifacts: &[Artifact],
    options: &BatchOptions,
) -> Result<BatchReport> {
    info!(
        "Downloading {} artifacts with concurrency {}",
        artifacts.len(),
        options.concurrency
    );

    let items = artifacts
        .iter()
        .map(|artifact| (artifact.name.clone(), artifact.clone()))
        .collect();

    let job = {
        let ctx = ctx.clone();
        let client = client.clone();
        let dest_dir = options.dest_dir.clone();
        let buffer_size = options.buffer_size;
        move |artifact: Artifact, cancel: CancellationToken| {
            let ctx = ctx.clone();
            let client = client.clone();
            let dest = artifact_path(&dest_dir, &artifact.name);
            async move {
                ctx.emit(FetchEvent::DownloadStarted {
                    artifact: artifact.name.clone(),
                });
                info!(
                    "Downloading {} ({} bytes)",
                    artifact.name, artifact.size_bytes
                );
                let progress = ctx.progress();
                transfer(
                    &client,
                    &artifact.download_url,
                    &dest,
                    buffer_size,
                    progress.as_deref(),
                    &cancel,
                )
                .await?;
                Ok(dest)
            }
        }
    };

    let outcomes = run_bounded(
        items,
        options.concurrency,
        options.timeout,
        ctx.cancellation(),
        job,
    )
    .await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(path) => ctx.emit(FetchEvent::DownloadFinished {
                artifact: outcome.artifact.clone(),
                path: path.clone(),
            }),
            Err(e) => {
                error!("Download of {} failed: {e}", outcome.artifact);
                ctx.emit(FetchEvent::DownloadFailed {
                    artifact: outcome.artifact.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let report = collect_outcomes(outcomes)?;
    info!(
        "Artifact downloads complete: {} succeeded, {} failed",
        report.paths.len(),
        report.failures.len()
    );
    Ok(report)
}

/// `<dest_dir>/<artifact name>`, keeping only the final path component
fn artifact_path(dest_dir: &Path, name: &str) -> PathBuf {
    let file_name = Path::new(name)
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "artifact".into());
    dest_dir.join(file_name)
}
