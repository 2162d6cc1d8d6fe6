use crate::error::ContextError;
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// A cancellation scope handed to every storage and service operation.
///
/// A context is cancelled either explicitly through the [`CancelHandle`]
/// returned by [`Context::with_cancel`], or implicitly once its deadline
/// passes. Clones share the same cancellation state.
///
/// Operations call [`Context::check`] before doing any work and wrap
/// every suspension point in [`Context::run`], so a cancelled context
/// stops them at the next await.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signal: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the [`Context`] it was created with, and all of its clones.
///
/// Dropping the handle does not cancel the context.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh context that can be cancelled through the returned handle.
    ///
    /// The new scope is independent of any other context, which is what a
    /// detached background task wants.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let ctx = Self {
            signal: Some(receiver),
            deadline: None,
        };
        let handle = CancelHandle {
            sender: Arc::new(sender),
        };
        (ctx, handle)
    }

    /// Derives a context that additionally expires after `timeout`.
    ///
    /// An earlier deadline already set on `self` wins. A timeout too large
    /// to represent as an instant adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Derives a context that additionally expires at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reports why the context stopped, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if self.signal.as_ref().is_some_and(|signal| *signal.borrow()) {
            return Some(ContextError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(ContextError::DeadlineExceeded);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Fails fast when the context has already stopped.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        let signal = self.signal.clone();
        let cancelled = async move {
            if let Some(mut signal) = signal {
                // Err means every handle is gone, so nobody can cancel anymore.
                if signal.wait_for(|cancelled| *cancelled).await.is_ok() {
                    return;
                }
            }
            pending::<()>().await
        };

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => ContextError::Cancelled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }

    /// Drives `fut` to completion unless the context stops first.
    ///
    /// When the context wins, `fut` is dropped without being polled again.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_never_stops() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn cancel_is_seen_by_clones() {
        let (ctx, handle) = Context::with_cancel();
        let clone = ctx.clone();
        assert!(!clone.is_done());

        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
        assert_eq!(clone.done().await, ContextError::Cancelled);
    }

    #[tokio::test]
    async fn run_fails_fast_on_cancelled_context() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = ctx
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        assert_eq!(result, Err(ContextError::Cancelled));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn run_is_interrupted_by_cancel() {
        let (ctx, handle) = Context::with_cancel();

        let task = tokio::spawn(async move { ctx.run(pending::<()>()).await });
        tokio::task::yield_now().await;
        handle.cancel();

        assert_eq!(task.await.unwrap(), Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        assert!(ctx.check().is_ok());

        let result = ctx.run(tokio::time::sleep(Duration::from_secs(60))).await;

        assert_eq!(result, Err(ContextError::DeadlineExceeded));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_deadline_wins() {
        let short = Context::background().with_timeout(Duration::from_secs(1));
        let first = short.deadline().unwrap();

        let derived = short.with_timeout(Duration::from_secs(100));

        assert_eq!(derived.deadline(), Some(first));
    }

    #[tokio::test]
    async fn unrepresentable_timeout_adds_no_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ctx.deadline(), None);
        assert!(ctx.check().is_ok());

        let bounded = Context::background()
            .with_timeout(Duration::from_secs(5))
            .with_timeout(Duration::MAX);
        assert!(bounded.deadline().is_some());
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (ctx, handle) = Context::with_cancel();
        drop(handle);

        assert!(ctx.check().is_ok());
        let result = ctx.run(async { "done" }).await;
        assert_eq!(result, Ok("done"));
    }
}
