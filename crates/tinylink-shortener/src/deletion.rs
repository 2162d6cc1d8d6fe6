//! Owner-scoped bulk deletion.
//!
//! The owner's links are streamed through a bounded queue to a fixed set
//! of filter workers. Workers forward the links whose code was requested
//! into a shared output queue, and the caller collects them into one batch
//! for [`LinkRepository::mark_deleted`]. Every send and receive races the
//! [`Context`], so cancellation stops all stages and drops the batch
//! before anything is written.

use std::collections::HashSet;
use std::sync::Arc;
use tinylink_core::{
    CancelHandle, Context, ContextError, Link, LinkRepository, ShortCode, ShortenerError,
    StorageError, StorageResultExt, UserId,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, trace};

/// Capacity of each internal queue.
const QUEUE_CAPACITY: usize = 64;

/// Worker count used when none is configured: one per available core.
pub fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Marks the `requested` codes of `owner` as deleted.
///
/// Codes that `owner` does not own are ignored. Returns how many links
/// changed state.
pub async fn mark_as_deleted<R>(
    ctx: &Context,
    repository: &R,
    owner: &UserId,
    requested: Vec<ShortCode>,
    workers: usize,
) -> Result<u64, ShortenerError>
where
    R: LinkRepository + ?Sized,
{
    ctx.check()?;

    let owned = match repository.select_by_owner(ctx, owner).await {
        Ok(owned) => owned,
        Err(StorageError::NotFound(_)) => Vec::new(),
        Err(err) => return Err(ShortenerError::storage("mark_as_deleted", err)),
    };

    if owned.is_empty() || requested.is_empty() {
        debug!(user = %owner, requested = requested.len(), "nothing to delete");
        return Ok(0);
    }

    let requested_count = requested.len();
    let requested: Arc<HashSet<ShortCode>> = Arc::new(requested.into_iter().collect());
    let selected = select_owned(ctx, owned, requested, workers).await?;

    if selected.is_empty() {
        debug!(user = %owner, requested = requested_count, "no requested code is owned by user");
        return Ok(0);
    }

    let changed = repository
        .mark_deleted(ctx, &selected)
        .await
        .op("mark_as_deleted")?;
    info!(
        user = %owner,
        requested = requested_count,
        selected = selected.len(),
        changed,
        "marked links as deleted"
    );

    Ok(changed)
}

/// Fans `owned` out to `workers` filters and fans the matches back in.
async fn select_owned(
    ctx: &Context,
    owned: Vec<Link>,
    requested: Arc<HashSet<ShortCode>>,
    workers: usize,
) -> Result<Vec<Link>, ContextError> {
    let stages = spawn_stages(ctx, owned, requested, workers);
    collect(ctx, stages).await
}

/// The running feeder and filter tasks, plus the queue they fan into.
struct Stages {
    // Dropping the set aborts whatever is still running.
    tasks: JoinSet<()>,
    selected: mpsc::Receiver<Link>,
}

fn spawn_stages(
    ctx: &Context,
    owned: Vec<Link>,
    requested: Arc<HashSet<ShortCode>>,
    workers: usize,
) -> Stages {
    let workers = workers.clamp(1, owned.len().max(1));
    let (input_tx, input_rx) = mpsc::channel::<Link>(QUEUE_CAPACITY);
    let (output_tx, output_rx) = mpsc::channel::<Link>(QUEUE_CAPACITY);
    let input_rx = Arc::new(Mutex::new(input_rx));

    let mut tasks = JoinSet::new();

    let feeder_ctx = ctx.clone();
    tasks.spawn(async move {
        for link in owned {
            tokio::select! {
                biased;
                _ = feeder_ctx.done() => return,
                sent = input_tx.send(link) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });

    for worker in 0..workers {
        let ctx = ctx.clone();
        let input = Arc::clone(&input_rx);
        let output = output_tx.clone();
        let requested = Arc::clone(&requested);

        tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = ctx.done() => return,
                    link = async { input.lock().await.recv().await } => link,
                };
                let Some(link) = next else {
                    return;
                };

                if !requested.contains(&link.short_code) {
                    continue;
                }

                trace!(worker, code = %link.short_code, "selected link for deletion");
                tokio::select! {
                    biased;
                    _ = ctx.done() => return,
                    sent = output.send(link) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    Stages {
        tasks,
        selected: output_rx,
    }
}

/// Drains the output queue until every filter is done or `ctx` stops.
async fn collect(ctx: &Context, mut stages: Stages) -> Result<Vec<Link>, ContextError> {
    let mut selected = Vec::new();
    loop {
        tokio::select! {
            biased;
            reason = ctx.done() => return Err(reason),
            link = stages.selected.recv() => match link {
                Some(link) => selected.push(link),
                None => break,
            },
        }
    }

    while let Some(joined) = stages.tasks.join_next().await {
        if let Err(err) = joined {
            resume_if_panicked(err);
        }
    }

    // Workers also stop on cancellation, which closes the output queue.
    ctx.check()?;
    Ok(selected)
}

fn resume_if_panicked(err: JoinError) {
    if err.is_panic() {
        std::panic::resume_unwind(err.into_panic());
    }
}

/// A deletion running detached from the request that asked for it.
///
/// The task owns its own [`Context`], so it keeps going after the
/// request's context is cancelled. It can still be stopped through
/// [`DeletionTask::cancel`] or by its own timeout.
#[derive(Debug)]
pub struct DeletionTask {
    handle: JoinHandle<Result<u64, ShortenerError>>,
    cancel: CancelHandle,
}

impl DeletionTask {
    pub(crate) fn new(
        handle: JoinHandle<Result<u64, ShortenerError>>,
        cancel: CancelHandle,
    ) -> Self {
        Self { handle, cancel }
    }

    /// Asks the pipeline to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the pipeline and returns how many links it marked.
    pub async fn wait(self) -> Result<u64, ShortenerError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(ShortenerError::Cancelled(ContextError::Cancelled)),
        }
    }
}
