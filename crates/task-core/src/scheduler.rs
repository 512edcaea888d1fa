//! The scheduler collaborator: runs a job once after a delay, cancellably.
//! This is the second external collaborator the task contract depends on
//! (alongside the [`crate::executor::Executor`]), used exclusively by
//! [`crate::leaf::timeout`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::contract::Canceller;
use crate::executor::Job;

/// Runs `job` once after `delay`, returning a [`Canceller`] that suppresses
/// the run if called before the delay elapses.
///
/// # Contract
/// - `job` must not run before `delay` elapses.
/// - Calling the returned canceller before `delay` elapses must prevent `job`
///   from ever running; calling it after is a no-op.
pub trait Scheduler: Send + Sync + 'static {
    fn schedule(&self, delay: Duration, job: Job) -> Canceller;
}

/// A shared, type-erased scheduler handle.
pub type DynScheduler = Arc<dyn Scheduler>;

/// `tokio`-backed default scheduler: `tokio::time::sleep` for the delay, a
/// `CancellationToken` to race against it. Grounded directly in the
/// teacher's own delayed-and-cancellable job pattern in
/// `worker_job_continuations.rs`.
pub struct DefaultScheduler {
    handle: tokio::runtime::Handle,
}

impl DefaultScheduler {
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for DefaultScheduler {
    fn schedule(&self, delay: Duration, job: Job) -> Canceller {
        let token = CancellationToken::new();
        let run_token = token.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    tracing::trace!(?delay, "task-core: timeout elapsed, running job");
                    job();
                }
                _ = run_token.cancelled() => {
                    tracing::trace!("task-core: timeout cancelled before it elapsed");
                }
            }
        });
        Box::new(move || token.cancel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[tokio::test]
    async fn job_runs_after_the_delay() {
        let scheduler = DefaultScheduler::current();
        let (tx, rx) = mpsc::channel();
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || tx.send(()).unwrap()),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn cancelling_before_the_delay_suppresses_the_job() {
        let scheduler = DefaultScheduler::current();
        let (tx, rx) = mpsc::channel::<()>();
        let cancel = scheduler.schedule(Duration::from_millis(50), Box::new(move || tx.send(()).unwrap()));
        cancel();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());
    }
}
