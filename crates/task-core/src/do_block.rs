//! The two ways to run a task for its side effect rather than composing it
//! further: `do_task` (the spec's `do!`) starts it eagerly and hands back a
//! re-subscribable, cancellable handle; `block_on` (the spec's `do!!`)
//! blocks the calling thread until it settles.

use std::sync::Arc;

use crate::contract::{Canceller, Continuation, Task};
use crate::error::{BlockOnError, Cancellable, TTask, TaskError};
use crate::promise::Promise;

/// A task that has already been started, backed by a [`Promise`] so every
/// call to [`Task::start`] on it — including ones made after it has already
/// settled — observes the one real result.
pub struct JoinHandle<T, E> {
    promise: Arc<Promise<T, E>>,
    canceller: Canceller,
}

impl<T, E> JoinHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Cancellable + 'static,
{
    /// Cancel the underlying run. Idempotent, like any [`Canceller`].
    pub fn cancel(&self) {
        (self.canceller)();
    }
}

impl<T, E> Task<T, E> for JoinHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + Cancellable + 'static,
{
    fn start(&self, on_success: Continuation<T>, on_failure: Continuation<E>) -> Canceller {
        self.promise.start(on_success, on_failure)
    }
}

/// Start `task` immediately against its own continuations, memoizing the
/// result behind a promise so it can be observed more than once and so
/// additional subscribers joining later still see it.
pub fn do_task<T, E>(task: TTask<T, E>) -> JoinHandle<T, TaskError<E>>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let promise = Promise::new();
    let on_success_promise = Arc::clone(&promise);
    let on_failure_promise = Arc::clone(&promise);
    let canceller = task.start(
        Box::new(move |value| on_success_promise.succeed(value)),
        Box::new(move |error| on_failure_promise.fail(error)),
    );
    JoinHandle { promise, canceller }
}

fn current_thread_runtime_would_deadlock() -> bool {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::CurrentThread,
        Err(_) => false,
    }
}

/// Run `task` to completion and block the calling thread for its result.
///
/// Fails with [`BlockOnError::NoThreadSuspension`] without starting the task
/// at all when the calling thread is a worker of a single-threaded `tokio`
/// runtime: blocking it here would starve the only thread capable of
/// driving `task`'s own continuations, deadlocking forever. This is the
/// concrete, detectable form of the spec's "host cannot suspend the calling
/// thread" failure.
pub fn block_on<T, E>(task: TTask<T, E>) -> Result<T, BlockOnError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    if current_thread_runtime_would_deadlock() {
        return Err(BlockOnError::NoThreadSuspension);
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let tx_failure = tx.clone();
    let _cancel = task.start(
        Box::new(move |value| {
            let _ = tx.send(Ok(value));
        }),
        Box::new(move |error| {
            let _ = tx_failure.send(Err(error));
        }),
    );
    match rx.recv() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(BlockOnError::Failed(error)),
        Err(_) => Err(BlockOnError::Failed(TaskError::ExecutorTerminated)),
    }
}
