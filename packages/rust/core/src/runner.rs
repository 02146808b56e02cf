//! Bounded concurrent task runner.
//!
//! [`run_bounded`] maps every item through an async task with at most
//! `concurrency` tasks in flight. Tasks that fail or yield nothing are
//! dropped and never stop the rest. Survivors come back in input order no
//! matter which order they completed in.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dealscout_shared::Result;

use crate::pipeline::ProgressReporter;

/// Per-call-site runner settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Name used in logs and progress updates.
    pub label: String,
    /// Maximum tasks in flight. Zero is treated as one.
    pub concurrency: usize,
    /// Report progress every N completions (and once at the end).
    pub progress_every: usize,
    /// Once cancelled, queued tasks are skipped and in-flight tasks dropped.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new(label: impl Into<String>, concurrency: usize) -> Self {
        Self {
            label: label.into(),
            concurrency,
            progress_every: 5,
            cancel: CancellationToken::new(),
        }
    }

    pub fn progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Run `task` over `items` with bounded concurrency.
///
/// `Ok(Some(r))` is kept, `Ok(None)` is dropped silently, `Err` is logged with
/// its failure kind and dropped.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
    task: F,
) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<Option<R>>>,
{
    let total = items.len();
    let every = options.progress_every.max(1);
    let completed = AtomicUsize::new(0);
    let label = options.label.as_str();
    let cancel = &options.cancel;
    let task = &task;
    let completed = &completed;

    debug!(label, total, concurrency = options.concurrency, "running tasks");

    let mut survivors: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move {
            if cancel.is_cancelled() {
                return None;
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                outcome = task(item) => outcome,
            };

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % every == 0 || done == total {
                progress.task_progress(label, done, total);
            }

            match outcome {
                Ok(Some(result)) => Some((index, result)),
                Ok(None) => None,
                Err(e) => {
                    warn!(label, index, failure = %e.task_failure(), error = %e, "task failed, dropping");
                    None
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .filter_map(|slot| async move { slot })
        .collect()
        .await;

    survivors.sort_by_key(|(index, _)| *index);

    let finished = completed.load(Ordering::Relaxed);
    if finished < total {
        warn!(label, finished, total, "runner stopped early");
    }
    debug!(label, kept = survivors.len(), total, "tasks finished");

    survivors.into_iter().map(|(_, result)| result).collect()
}
